//! In-memory task store and its list-file persistence.
//!
//! This module provides the `TaskStore` struct which owns every task and the
//! id counter, answers hierarchy queries, feeds filtered traversals to the
//! front ends, and converts the whole list to and from its JSON file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TodoError};
use crate::fields::TaskFilter;
use crate::task::{now_millis, Task, TaskRecord, MAX_SAFE_INTEGER};

/// All tasks of one to-do list, in ascending id order.
///
/// Ids only grow: tasks are appended with `max_id + 1` and never removed, so
/// insertion order and id order coincide.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskStore {
    tasks: Vec<Task>,
    max_id: u64,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        TaskStore::default()
    }

    /// Create a store holding the given raw records.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let mut store = TaskStore::new();
        store.load(records)?;
        Ok(store)
    }

    /// Open the list file, starting empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no list file yet, starting empty");
            return Ok(TaskStore::new());
        }
        let buf = fs::read_to_string(path).map_err(|source| TodoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store = TaskStore::new();
        store.load_str(&buf)?;
        debug!(path = %path.display(), tasks = store.len(), "loaded list file");
        Ok(store)
    }

    /// Save the list file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |source| TodoError::Io {
            path: path.to_path_buf(),
            source,
        };
        let data = self.serialize()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        debug!(path = %path.display(), tasks = self.len(), "saved list file");
        Ok(())
    }

    /// Replace every task with the given raw records.
    ///
    /// Each record is validated with `Task::from_raw`; ids must be unique and
    /// parents must name other tasks in the same batch without forming a
    /// cycle. On error nothing is replaced.
    pub fn load(&mut self, records: &[Value]) -> Result<()> {
        let mut tasks = records
            .iter()
            .map(Task::from_raw)
            .collect::<Result<Vec<_>>>()?;
        tasks.sort_by_key(Task::id);

        if let Some(pair) = tasks.windows(2).find(|w| w[0].id() == w[1].id()) {
            return Err(TodoError::malformed(Some(pair[0].id()), "duplicate id"));
        }
        check_parents(&tasks)?;

        self.max_id = tasks.last().map_or(0, Task::id);
        self.tasks = tasks;
        debug!(tasks = self.tasks.len(), max_id = self.max_id, "task list loaded");
        Ok(())
    }

    /// Parse a list-file document and `load` it.
    pub fn load_str(&mut self, json: &str) -> Result<()> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(records) = value else {
            return Err(TodoError::malformed(None, "expected a JSON array of tasks"));
        };
        self.load(&records)
    }

    /// The whole list as pretty-printed JSON, in store order.
    pub fn serialize(&self) -> Result<String> {
        let records: Vec<TaskRecord> = self.tasks.iter().map(Task::to_raw).collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// The id the next created task will get.
    pub fn next_id(&self) -> u64 {
        self.max_id.saturating_add(1)
    }

    /// Add an incomplete task started now and return its id.
    pub fn create_task(&mut self, description: impl Into<String>, parent: Option<u64>) -> Result<u64> {
        self.create_task_at(description, parent, now_millis())
    }

    pub fn create_task_at(
        &mut self,
        description: impl Into<String>,
        parent: Option<u64>,
        now: i64,
    ) -> Result<u64> {
        let parent = parent.filter(|&pid| pid != 0);
        if let Some(pid) = parent {
            self.get(pid)?;
        }
        let id = self.next_id();
        if id > MAX_SAFE_INTEGER {
            return Err(TodoError::IdsExhausted(self.max_id));
        }
        self.tasks.push(Task::new(id, parent, description.into(), now));
        self.max_id = id;
        debug!(id, ?parent, "task created");
        Ok(id)
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.tasks.binary_search_by_key(&id, Task::id).ok()
    }

    /// Get a task by ID.
    pub fn find_by_id(&self, id: u64) -> Option<&Task> {
        self.position(id).map(|i| &self.tasks[i])
    }

    /// Get a task by ID, failing with `NotFound`.
    pub fn get(&self, id: u64) -> Result<&Task> {
        self.find_by_id(id).ok_or(TodoError::NotFound(id))
    }

    /// Get a mutable reference to a task by ID, failing with `NotFound`.
    pub fn get_mut(&mut self, id: u64) -> Result<&mut Task> {
        let idx = self.position(id).ok_or(TodoError::NotFound(id))?;
        Ok(&mut self.tasks[idx])
    }

    pub fn children_of(&self, id: u64) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.parent() == Some(id)).collect()
    }

    /// The parent of `id`, or `None` for a top-level task.
    pub fn parent_of(&self, id: u64) -> Result<Option<&Task>> {
        let task = self.get(id)?;
        Ok(task.parent().and_then(|pid| self.find_by_id(pid)))
    }

    /// Other tasks under the same parent. Top-level tasks have no siblings.
    pub fn siblings_of(&self, id: u64) -> Result<Vec<&Task>> {
        let task = self.get(id)?;
        let Some(pid) = task.parent() else {
            return Ok(Vec::new());
        };
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.parent() == Some(pid) && t.id() != id)
            .collect())
    }

    /// Collect ancestor task IDs by following parent references, closest first.
    pub fn ancestors_of(&self, id: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut cur = self.find_by_id(id).and_then(Task::parent);
        while let Some(pid) = cur {
            if chain.len() > self.tasks.len() {
                break; // cycle guard
            }
            chain.push(pid);
            cur = self.find_by_id(pid).and_then(Task::parent);
        }
        chain
    }

    /// Nesting depth used for tree indentation.
    pub fn depth_of(&self, id: u64) -> usize {
        self.ancestors_of(id).len()
    }

    /// Tasks matching `filter`, in store order.
    pub fn filtered<'a>(&'a self, filter: &TaskFilter) -> impl Iterator<Item = &'a Task> + 'a {
        let filter = *filter;
        self.tasks
            .iter()
            .filter(move |t| filter.status.matches(t.state()) && filter.range.contains(t.start()))
    }

    /// Call `visitor` on every task matching `filter`, in store order.
    pub fn for_each<'a, F>(&'a self, filter: &TaskFilter, mut visitor: F)
    where
        F: FnMut(&'a Task),
    {
        for task in self.filtered(filter) {
            visitor(task);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Reject dangling parents and parent cycles within a freshly parsed batch.
fn check_parents(tasks: &[Task]) -> Result<()> {
    let parents: HashMap<u64, Option<u64>> = tasks.iter().map(|t| (t.id(), t.parent())).collect();

    for task in tasks {
        if let Some(pid) = task.parent() {
            if !parents.contains_key(&pid) {
                return Err(TodoError::malformed(
                    Some(task.id()),
                    format!("parent {pid} does not exist"),
                ));
            }
        }
    }

    let mut acyclic: HashSet<u64> = HashSet::new();
    for task in tasks {
        let mut seen: HashSet<u64> = HashSet::new();
        let mut cur = Some(task.id());
        while let Some(id) = cur {
            if acyclic.contains(&id) {
                break;
            }
            if !seen.insert(id) {
                return Err(TodoError::malformed(
                    Some(task.id()),
                    "parent chain forms a cycle",
                ));
            }
            cur = parents.get(&id).copied().flatten();
        }
        acyclic.extend(seen);
    }
    Ok(())
}
