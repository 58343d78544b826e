//! Enumerations for TUI state management.

/// Application state for the terminal user interface.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AppState {
    TaskList,
    AddTask,
    EditTask,
    DateRange,
    Help,
}

impl AppState {
    /// Whether keystrokes go into a text field.
    pub fn is_text_entry(self) -> bool {
        matches!(self, AppState::AddTask | AppState::EditTask | AppState::DateRange)
    }
}
