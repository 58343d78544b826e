//! Task data structure and its lifecycle state machine.
//!
//! This module defines the `Task` struct that represents a single to-do item,
//! the `Lifecycle` variant that records whether it is open, done or dropped,
//! and the `TaskRecord` shape the list file stores on disk.

use std::fmt;

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, TodoError};
use crate::fields::State;

/// Longest summary line, ellipsis included.
pub const SUMMARY_MAX_LEN: usize = 30;

const ELLIPSIS: &str = "...";
const EMPTY_DESCRIPTION: &str = "(empty)";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Persisted `end` value for a cancelled task.
const CANCELLED_END: i64 = -1;

const RECORD_FIELDS: [&str; 5] = ["id", "pid", "desc", "start", "end"];

/// Largest id or timestamp a record may hold: the largest integer a JSON
/// number represents exactly.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Incomplete,
    Completed { at: i64 },
    Cancelled,
}

impl Lifecycle {
    pub fn state(&self) -> State {
        match self {
            Lifecycle::Incomplete => State::Incomplete,
            Lifecycle::Completed { .. } => State::Completed,
            Lifecycle::Cancelled => State::Cancelled,
        }
    }

    /// Decode the persisted `end` field: 0 open, negative cancelled, positive done.
    fn from_end(end: i64) -> Self {
        match end {
            0 => Lifecycle::Incomplete,
            e if e < 0 => Lifecycle::Cancelled,
            at => Lifecycle::Completed { at },
        }
    }

    fn to_end(self) -> i64 {
        match self {
            Lifecycle::Incomplete => 0,
            Lifecycle::Completed { at } => at,
            Lifecycle::Cancelled => CANCELLED_END,
        }
    }
}

/// One entry of the list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: u64,
    pub pid: u64,
    pub desc: String,
    pub start: i64,
    pub end: i64,
}

/// A single to-do item.
///
/// Fields are private: lifecycle changes go through the transition methods,
/// which reject calls made from the wrong state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: u64,
    parent: Option<u64>,
    description: String,
    start: i64,
    lifecycle: Lifecycle,
}

impl Task {
    pub(crate) fn new(id: u64, parent: Option<u64>, description: String, start: i64) -> Self {
        Task {
            id,
            parent,
            description,
            start,
            lifecycle: Lifecycle::Incomplete,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Creation time, or the time of the last reassignment.
    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    pub fn completed_at(&self) -> Option<i64> {
        match self.lifecycle {
            Lifecycle::Completed { at } => Some(at),
            _ => None,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        self.lifecycle == Lifecycle::Incomplete
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        self.lifecycle == Lifecycle::Cancelled
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    fn require(&self, state: State, operation: &'static str) -> Result<()> {
        if self.state() == state {
            Ok(())
        } else {
            Err(TodoError::InvalidTransition {
                id: self.id,
                state: self.state(),
                operation,
            })
        }
    }

    /// Mark an incomplete task as done now.
    pub fn complete(&mut self) -> Result<()> {
        self.complete_at(now_millis())
    }

    /// Mark an incomplete task as done at `now`. Never earlier than its start.
    pub fn complete_at(&mut self, now: i64) -> Result<()> {
        self.require(State::Incomplete, "complete")?;
        self.lifecycle = Lifecycle::Completed {
            at: now.max(self.start),
        };
        debug!(id = self.id, "task completed");
        Ok(())
    }

    /// Drop an incomplete task.
    pub fn cancel(&mut self) -> Result<()> {
        self.require(State::Incomplete, "cancel")?;
        self.lifecycle = Lifecycle::Cancelled;
        debug!(id = self.id, "task cancelled");
        Ok(())
    }

    /// Revert a completed task to incomplete.
    pub fn incomplete(&mut self) -> Result<()> {
        self.require(State::Completed, "reopen")?;
        self.lifecycle = Lifecycle::Incomplete;
        debug!(id = self.id, "task reopened");
        Ok(())
    }

    /// Bring a cancelled task back with a fresh start time.
    pub fn reassign(&mut self) -> Result<()> {
        self.reassign_at(now_millis())
    }

    pub fn reassign_at(&mut self, now: i64) -> Result<()> {
        self.require(State::Cancelled, "reassign")?;
        self.lifecycle = Lifecycle::Incomplete;
        self.start = now.max(self.start);
        debug!(id = self.id, start = self.start, "task reassigned");
        Ok(())
    }

    /// Replace the description. Only incomplete tasks can be edited.
    pub fn edit_description(&mut self, description: impl Into<String>) -> Result<()> {
        self.require(State::Incomplete, "edit")?;
        self.description = description.into();
        Ok(())
    }

    /// `"[id] first line"`, shortened to `SUMMARY_MAX_LEN` characters.
    ///
    /// The ellipsis is also added when the description has further lines.
    pub fn summary_label(&self) -> String {
        let mut lines = self
            .description
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());
        let first = lines.next();
        let multiline = lines.next().is_some();

        let body = match first {
            None => EMPTY_DESCRIPTION.to_string(),
            Some(line) if multiline || line.chars().count() > SUMMARY_MAX_LEN => {
                let cut: String = line
                    .chars()
                    .take(SUMMARY_MAX_LEN - ELLIPSIS.len())
                    .collect();
                format!("{}{}", cut.trim_end(), ELLIPSIS)
            }
            Some(line) => line.to_string(),
        };
        format!("[{}] {}", self.id, body)
    }

    /// Assignment time plus current status, rendered in local time.
    pub fn time_range_label(&self) -> String {
        self.time_range_label_in(&Local)
    }

    pub fn time_range_label_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let format_time = |ms: i64| match tz.timestamp_millis_opt(ms).single() {
            Some(t) => t.format(TIME_FORMAT).to_string(),
            None => ms.to_string(),
        };

        let assigned = format!("Assigned on {}.", format_time(self.start));
        match self.lifecycle {
            Lifecycle::Incomplete => format!("{assigned} In progress."),
            Lifecycle::Cancelled => format!("{assigned} Cancelled."),
            Lifecycle::Completed { at } => format!(
                "{assigned} Completed on {} ({}).",
                format_time(at),
                format_span(at.saturating_sub(self.start))
            ),
        }
    }

    /// Validate a raw list-file entry and build the task it describes.
    ///
    /// The entry must be an object with exactly the fields `id`, `pid`,
    /// `desc`, `start` and `end`.
    pub fn from_raw(raw: &Value) -> Result<Task> {
        let obj = raw
            .as_object()
            .ok_or_else(|| TodoError::malformed(None, "expected an object"))?;

        let id = match obj.get("id") {
            None => return Err(TodoError::malformed(None, "missing field `id`")),
            Some(v) => v
                .as_u64()
                .filter(|&id| id != 0 && id <= MAX_SAFE_INTEGER)
                .ok_or_else(|| {
                    TodoError::malformed(None, "`id` must be a positive integer below 2^53")
                })?,
        };

        if let Some(extra) = obj.keys().find(|k| !RECORD_FIELDS.contains(&k.as_str())) {
            return Err(TodoError::malformed(
                Some(id),
                format!("unexpected field `{extra}`"),
            ));
        }

        let pid = field(obj, "pid", id)?
            .as_u64()
            .filter(|&pid| pid <= MAX_SAFE_INTEGER)
            .ok_or_else(|| {
                TodoError::malformed(Some(id), "`pid` must be a non-negative integer below 2^53")
            })?;
        let desc = field(obj, "desc", id)?
            .as_str()
            .ok_or_else(|| TodoError::malformed(Some(id), "`desc` must be a string"))?;
        let start = timestamp(field(obj, "start", id)?)
            .ok_or_else(|| TodoError::malformed(Some(id), "`start` must be a number within 2^53"))?;
        let end = timestamp(field(obj, "end", id)?)
            .ok_or_else(|| TodoError::malformed(Some(id), "`end` must be a number within 2^53"))?;

        if pid == id {
            return Err(TodoError::malformed(Some(id), "task cannot be its own parent"));
        }
        let lifecycle = Lifecycle::from_end(end);
        if let Lifecycle::Completed { at } = lifecycle {
            if at < start {
                return Err(TodoError::malformed(
                    Some(id),
                    "completion time precedes start time",
                ));
            }
        }

        Ok(Task {
            id,
            parent: (pid != 0).then_some(pid),
            description: desc.to_string(),
            start,
            lifecycle,
        })
    }

    /// The list-file entry for this task.
    pub fn to_raw(&self) -> TaskRecord {
        TaskRecord {
            id: self.id,
            pid: self.parent.unwrap_or(0),
            desc: self.description.clone(),
            start: self.start,
            end: self.lifecycle.to_end(),
        }
    }
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str, id: u64) -> Result<&'a Value> {
    obj.get(name)
        .ok_or_else(|| TodoError::malformed(Some(id), format!("missing field `{name}`")))
}

/// Read a JSON number as whole milliseconds, truncating any fraction.
/// Values beyond 2^53 in magnitude are refused.
fn timestamp(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    let limit = MAX_SAFE_INTEGER as i64;
    let ms = match n.as_i64() {
        Some(ms) => ms,
        None => {
            let f = n.as_f64()?.trunc();
            if !f.is_finite() || f.abs() > limit as f64 {
                return None;
            }
            f as i64
        }
    };
    (-limit..=limit).contains(&ms).then_some(ms)
}

/// Elapsed time in whole days, or whole hours below one day.
pub fn format_span(ms: i64) -> String {
    let days = ms / DAY_MS;
    if days >= 1 {
        plural(days, "day")
    } else {
        plural((ms / HOUR_MS).max(0), "hour")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(desc: &str) -> Task {
        Task::new(1, None, desc.to_string(), 1_000)
    }

    fn assert_invalid(result: Result<()>, expected_state: State) {
        match result {
            Err(TodoError::InvalidTransition { state, .. }) => assert_eq!(state, expected_state),
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn test_new_task_is_incomplete() {
        let t = task("Buy milk");
        assert!(t.is_incomplete());
        assert!(!t.is_completed());
        assert!(!t.is_cancelled());
        assert!(!t.has_parent());
        assert_eq!(t.completed_at(), None);
    }

    #[test]
    fn test_complete_twice_fails() {
        let mut t = task("Buy milk");
        t.complete_at(5_000).unwrap();
        assert!(t.is_completed());
        assert_eq!(t.completed_at(), Some(5_000));

        assert_invalid(t.complete_at(6_000), State::Completed);
        assert_eq!(t.completed_at(), Some(5_000));
    }

    #[test]
    fn test_completion_never_precedes_start() {
        let mut t = task("clock went backwards");
        t.complete_at(10).unwrap();
        assert_eq!(t.completed_at(), Some(t.start()));
    }

    #[test]
    fn test_complete_uses_wall_clock() {
        let mut t = Task::new(1, None, "now".into(), now_millis());
        t.complete().unwrap();
        assert!(t.completed_at().unwrap() >= t.start());
    }

    #[test]
    fn test_cancel_and_reassign() {
        let mut t = Task::new(4, Some(2), "Paint fence".into(), 1_000);
        t.cancel().unwrap();
        assert!(t.is_cancelled());
        assert_invalid(t.complete_at(2_000), State::Cancelled);
        assert_invalid(t.incomplete(), State::Cancelled);
        assert_invalid(t.edit_description("x"), State::Cancelled);

        t.reassign_at(9_000).unwrap();
        assert!(t.is_incomplete());
        assert_eq!(t.start(), 9_000);
        assert_eq!(t.id(), 4);
        assert_eq!(t.parent(), Some(2));
        assert_eq!(t.description(), "Paint fence");
    }

    #[test]
    fn test_reassign_keeps_start_monotonic() {
        let mut t = task("x");
        t.cancel().unwrap();
        t.reassign_at(500).unwrap();
        assert_eq!(t.start(), 1_000);
    }

    #[test]
    fn test_reassign_only_from_cancelled() {
        let mut t = task("x");
        assert_invalid(t.reassign_at(2_000), State::Incomplete);
        t.complete_at(2_000).unwrap();
        assert_invalid(t.reassign_at(3_000), State::Completed);
    }

    #[test]
    fn test_incomplete_reverts_completion() {
        let mut t = task("x");
        assert_invalid(t.incomplete(), State::Incomplete);
        t.complete_at(2_000).unwrap();
        t.incomplete().unwrap();
        assert!(t.is_incomplete());
        assert_eq!(t.completed_at(), None);
        assert_eq!(t.start(), 1_000);
    }

    #[test]
    fn test_cancel_requires_incomplete() {
        let mut t = task("x");
        t.complete_at(2_000).unwrap();
        assert_invalid(t.cancel(), State::Completed);
    }

    #[test]
    fn test_edit_description_while_incomplete() {
        let mut t = task("old");
        t.edit_description("new").unwrap();
        assert_eq!(t.description(), "new");

        t.complete_at(2_000).unwrap();
        assert_invalid(t.edit_description("newer"), State::Completed);
        assert_eq!(t.description(), "new");
    }

    #[test]
    fn test_transition_error_names_task_and_operation() {
        let mut t = Task::new(12, None, "x".into(), 0);
        t.cancel().unwrap();
        let err = t.cancel().unwrap_err();
        assert_eq!(err.to_string(), "cannot cancel task 12: it is cancelled");
    }

    #[test]
    fn test_summary_label() {
        assert_eq!(task("Buy milk").summary_label(), "[1] Buy milk");
        assert_eq!(task("  padded  ").summary_label(), "[1] padded");
        assert_eq!(task("").summary_label(), "[1] (empty)");
        assert_eq!(task(" \n \n").summary_label(), "[1] (empty)");

        // Exactly at the limit stays whole.
        let thirty = "a".repeat(30);
        assert_eq!(task(&thirty).summary_label(), format!("[1] {thirty}"));

        let long = "Write the quarterly report for the board";
        assert_eq!(task(long).summary_label(), "[1] Write the quarterly report...");

        assert_eq!(
            task("Groceries\n- milk\n- eggs").summary_label(),
            "[1] Groceries..."
        );
        assert_eq!(task("\n\nSecond line first").summary_label(), "[1] Second line first");
    }

    #[test]
    fn test_summary_label_counts_characters() {
        let accented = "é".repeat(31);
        let label = task(&accented).summary_label();
        assert_eq!(label, format!("[1] {}...", "é".repeat(27)));
    }

    #[test]
    fn test_time_range_label() {
        let start = 1_700_000_000_000; // 2023-11-14 22:13 UTC
        let mut t = Task::new(1, None, "x".into(), start);
        assert_eq!(
            t.time_range_label_in(&Utc),
            "Assigned on 2023-11-14 22:13. In progress."
        );

        t.complete_at(start + 3 * HOUR_MS + 5).unwrap();
        assert_eq!(
            t.time_range_label_in(&Utc),
            "Assigned on 2023-11-14 22:13. Completed on 2023-11-15 01:13 (3 hours)."
        );

        let mut t = Task::new(1, None, "x".into(), start);
        t.complete_at(start + 2 * DAY_MS + 20 * HOUR_MS).unwrap();
        assert!(t.time_range_label_in(&Utc).ends_with("(2 days)."));

        let mut t = Task::new(1, None, "x".into(), start);
        t.cancel().unwrap();
        assert_eq!(
            t.time_range_label_in(&Utc),
            "Assigned on 2023-11-14 22:13. Cancelled."
        );
    }

    #[test]
    fn test_format_span() {
        assert_eq!(format_span(0), "0 hours");
        assert_eq!(format_span(HOUR_MS), "1 hour");
        assert_eq!(format_span(DAY_MS - 1), "23 hours");
        assert_eq!(format_span(DAY_MS), "1 day");
        assert_eq!(format_span(10 * DAY_MS + HOUR_MS), "10 days");
    }

    #[test]
    fn test_from_raw_states() {
        let open = Task::from_raw(&json!({"id": 1, "pid": 0, "desc": "a", "start": 100, "end": 0})).unwrap();
        assert!(open.is_incomplete());
        assert!(!open.has_parent());

        let done = Task::from_raw(&json!({"id": 2, "pid": 1, "desc": "b", "start": 100, "end": 250})).unwrap();
        assert_eq!(done.completed_at(), Some(250));
        assert_eq!(done.parent(), Some(1));

        let dropped = Task::from_raw(&json!({"id": 3, "pid": 0, "desc": "c", "start": 100, "end": -1})).unwrap();
        assert!(dropped.is_cancelled());
    }

    #[test]
    fn test_from_raw_truncates_fractional_timestamps() {
        let t = Task::from_raw(&json!({"id": 1, "pid": 0, "desc": "a", "start": 100.9, "end": 0})).unwrap();
        assert_eq!(t.start(), 100);
    }

    #[test]
    fn test_from_raw_rejects_bad_shapes() {
        let cases = [
            (json!([1, 2]), None),
            (json!({"pid": 0, "desc": "a", "start": 1, "end": 0}), None),
            (json!({"id": 0, "pid": 0, "desc": "a", "start": 1, "end": 0}), None),
            (json!({"id": "1", "pid": 0, "desc": "a", "start": 1, "end": 0}), None),
            (json!({"id": 1, "pid": 0, "desc": "a", "start": 1}), Some(1)),
            (json!({"id": 1, "pid": -2, "desc": "a", "start": 1, "end": 0}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": 5, "start": 1, "end": 0}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": "a", "start": "x", "end": 0}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": "a", "start": 1, "end": null}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": "a", "start": 1, "end": 0, "done": true}), Some(1)),
            (json!({"id": 1, "pid": 1, "desc": "a", "start": 1, "end": 0}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": "a", "start": 500, "end": 400}), Some(1)),
        ];
        for (raw, expected_id) in cases {
            match Task::from_raw(&raw) {
                Err(TodoError::MalformedRecord { id, .. }) => assert_eq!(id, expected_id, "{raw}"),
                other => panic!("expected MalformedRecord for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_raw_rejects_out_of_range_numbers() {
        let cases = [
            (json!({"id": 1, "pid": 0, "desc": "x", "start": -1e300, "end": 5}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": "x", "start": 0, "end": 1e19}), Some(1)),
            (json!({"id": 1, "pid": 0, "desc": "x", "start": i64::MIN, "end": 5}), Some(1)),
            (json!({"id": u64::MAX, "pid": 0, "desc": "x", "start": 0, "end": 0}), None),
            (json!({"id": 1, "pid": MAX_SAFE_INTEGER + 1, "desc": "x", "start": 0, "end": 0}), Some(1)),
        ];
        for (raw, expected_id) in cases {
            match Task::from_raw(&raw) {
                Err(TodoError::MalformedRecord { id, .. }) => assert_eq!(id, expected_id, "{raw}"),
                other => panic!("expected MalformedRecord for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_extreme_timestamps_still_render() {
        let limit = MAX_SAFE_INTEGER as i64;
        let raw = json!({"id": MAX_SAFE_INTEGER, "pid": 0, "desc": "x", "start": -limit, "end": limit});
        let t = Task::from_raw(&raw).unwrap();
        let label = t.time_range_label_in(&Utc);
        assert!(label.ends_with("days)."), "{label}");
    }

    #[test]
    fn test_raw_round_trip() {
        let mut done = Task::new(7, Some(3), "multi\nline".into(), 1_000);
        done.complete_at(4_000).unwrap();
        let mut dropped = Task::new(8, None, "gone".into(), 2_000);
        dropped.cancel().unwrap();

        for t in [task("open"), done, dropped] {
            let value = serde_json::to_value(t.to_raw()).unwrap();
            assert_eq!(Task::from_raw(&value).unwrap(), t);
        }
    }

    #[test]
    fn test_cancelled_persists_negative_end() {
        let mut t = task("x");
        t.cancel().unwrap();
        assert_eq!(t.to_raw().end, CANCELLED_END);
    }
}
