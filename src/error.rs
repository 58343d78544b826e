//! Error types shared by the task model, the store and the front ends.

use std::path::PathBuf;

use crate::fields::State;

/// Everything that can go wrong when loading, querying or mutating tasks.
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    /// A persisted record does not match the expected schema.
    #[error("malformed record{}: {reason}", task_suffix(.id))]
    MalformedRecord { id: Option<u64>, reason: String },

    /// A lifecycle operation was called from a state that forbids it.
    #[error("cannot {operation} task {id}: it is {state}")]
    InvalidTransition {
        id: u64,
        state: State,
        operation: &'static str,
    },

    /// Every id a list file can hold has been handed out.
    #[error("no task ids left: the largest id is {0}")]
    IdsExhausted(u64),

    /// No task has the given id.
    #[error("task {0} not found")]
    NotFound(u64),

    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TodoError {
    pub(crate) fn malformed(id: Option<u64>, reason: impl Into<String>) -> Self {
        TodoError::MalformedRecord {
            id,
            reason: reason.into(),
        }
    }
}

fn task_suffix(id: &Option<u64>) -> String {
    id.map(|id| format!(" (task {id})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, TodoError>;
