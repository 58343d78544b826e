//! Lifecycle state names and the filters used to select tasks.
//!
//! This module defines the plain `State` enumeration exposed to callers, the
//! status and start-time filters consumed by `TaskStore::for_each`, and the
//! date parsing used to build time ranges from user input.

use std::fmt;

use chrono::{Datelike, Local, NaiveDate, TimeDelta, TimeZone};

/// The three lifecycle states a task can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Incomplete,
    Completed,
    Cancelled,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Incomplete => "incomplete",
            State::Completed => "completed",
            State::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which lifecycle states to include. Each state toggles independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFilter {
    pub incomplete: bool,
    pub completed: bool,
    pub cancelled: bool,
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter {
            incomplete: true,
            completed: true,
            cancelled: true,
        }
    }
}

impl StatusFilter {
    /// A filter matching nothing, to be switched on state by state.
    pub fn none() -> Self {
        StatusFilter {
            incomplete: false,
            completed: false,
            cancelled: false,
        }
    }

    /// Build from command-line style flags: no flag at all means every state.
    pub fn from_flags(incomplete: bool, completed: bool, cancelled: bool) -> Self {
        if !incomplete && !completed && !cancelled {
            return StatusFilter::default();
        }
        StatusFilter {
            incomplete,
            completed,
            cancelled,
        }
    }

    pub fn matches(&self, state: State) -> bool {
        match state {
            State::Incomplete => self.incomplete,
            State::Completed => self.completed,
            State::Cancelled => self.cancelled,
        }
    }

    pub fn toggle(&mut self, state: State) {
        match state {
            State::Incomplete => self.incomplete = !self.incomplete,
            State::Completed => self.completed = !self.completed,
            State::Cancelled => self.cancelled = !self.cancelled,
        }
    }
}

/// Inclusive bounds on a task's start time, in epoch milliseconds.
/// An absent bound is not applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl DateRange {
    /// Build from raw timestamps where `0` means "unset".
    pub fn new(from: i64, to: i64) -> Self {
        DateRange {
            from: (from != 0).then_some(from),
            to: (to != 0).then_some(to),
        }
    }

    /// Range covering whole local days, from the start of `from` to the end of `to`.
    pub fn from_days(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        DateRange {
            from: from.and_then(start_of_day_millis),
            to: to.and_then(end_of_day_millis),
        }
    }

    pub fn contains(&self, start: i64) -> bool {
        self.from.map_or(true, |from| start >= from) && self.to.map_or(true, |to| start <= to)
    }
}

/// Combined selection applied by `TaskStore::for_each`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: StatusFilter,
    pub range: DateRange,
}

/// Parse human-readable date input relative to `today`.
///
/// Supports:
/// - "today", "yesterday"
/// - "start of week" / "sow" (Monday)
/// - "3d ago", "2w ago"
/// - "YYYY-MM-DD" format
pub fn parse_date_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "yesterday" => return today.pred_opt(),
        "start of week" | "sow" => {
            let weekday = today.weekday().num_days_from_monday() as i64;
            return days_before(today, TimeDelta::try_days(weekday)?);
        }
        _ => {}
    }

    if let Some(rest) = s.strip_suffix(" ago") {
        let rest = rest.trim();
        if let Some(nd) = rest.strip_suffix('d') {
            if let Ok(days) = nd.trim().parse::<i64>() {
                return days_before(today, TimeDelta::try_days(days)?);
            }
        }
        if let Some(nw) = rest.strip_suffix('w') {
            if let Ok(weeks) = nw.trim().parse::<i64>() {
                return days_before(today, TimeDelta::try_weeks(weeks)?);
            }
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

fn days_before(today: NaiveDate, delta: TimeDelta) -> Option<NaiveDate> {
    today.checked_sub_signed(delta)
}

/// First millisecond of `date` in local time.
pub fn start_of_day_millis(date: NaiveDate) -> Option<i64> {
    let dt = date.and_hms_opt(0, 0, 0)?;
    Local
        .from_local_datetime(&dt)
        .earliest()
        .map(|t| t.timestamp_millis())
}

/// Last millisecond of `date` in local time.
pub fn end_of_day_millis(date: NaiveDate) -> Option<i64> {
    let next = date.succ_opt()?;
    start_of_day_millis(next).map(|ms| ms - 1)
}
