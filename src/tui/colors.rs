//! Color constants for the terminal user interface.

use ratatui::style::Color;

use crate::fields::State;

// Native Color::White is used for open tasks

/// Used for completed tasks
pub const DIM_GREY: Color = Color::Rgb(110, 110, 110);
/// Used for cancelled tasks
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
/// Header and status bar background
pub const DARK_GREEN: Color = Color::Rgb(0, 80, 0);
/// Popup background
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);

/// Foreground color for a task row in the given state.
pub fn state_color(state: State) -> Color {
    match state {
        State::Incomplete => Color::White,
        State::Completed => DIM_GREY,
        State::Cancelled => DARK_RED,
    }
}
