//! Main application logic for the terminal user interface.
//!
//! This module contains the `App` struct which manages the TUI state,
//! handles user input, renders the interface, and drives the task store
//! through the same operations the CLI uses. Every change is saved to the
//! list file straight away.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};

use crate::error::Result;
use crate::fields::{parse_date_input, DateRange, State, TaskFilter};
use crate::store::TaskStore;
use crate::task::Task;
use crate::tui::{
    colors::{state_color, DARK_GREEN, DARK_PURPLE},
    enums::AppState,
    input::InputField,
    utils::centered_rect,
};

/// Main application state for the terminal user interface.
pub struct App {
    state: AppState,
    store: TaskStore,
    list_file: PathBuf,
    task_list_state: TableState,
    visible_tasks: Vec<u64>,
    filter: TaskFilter,
    range_text: String,
    input: InputField,
    form_parent: Option<u64>,
    status_message: String,
}

impl App {
    /// Create a new App on an already opened store.
    pub fn new(store: TaskStore, list_file: &Path) -> Self {
        let mut app = App {
            state: AppState::TaskList,
            store,
            list_file: list_file.to_path_buf(),
            task_list_state: TableState::default(),
            visible_tasks: Vec::new(),
            filter: TaskFilter::default(),
            range_text: String::new(),
            input: InputField::new(),
            form_parent: None,
            status_message: String::new(),
        };
        app.update_visible_tasks();
        app
    }

    /// Recompute the visible rows from the current filter.
    ///
    /// Keeps the selection on the same task when it is still visible.
    fn update_visible_tasks(&mut self) {
        let old_selected_id = self.selected_id();

        self.visible_tasks = self.store.filtered(&self.filter).map(Task::id).collect();

        let new_idx = old_selected_id
            .and_then(|id| self.visible_tasks.iter().position(|&v| v == id))
            .or(if self.visible_tasks.is_empty() { None } else { Some(0) });
        self.task_list_state.select(new_idx);
    }

    fn select_task(&mut self, id: u64) -> bool {
        match self.visible_tasks.iter().position(|&v| v == id) {
            Some(idx) => {
                self.task_list_state.select(Some(idx));
                true
            }
            None => false,
        }
    }

    fn selected_id(&self) -> Option<u64> {
        self.task_list_state
            .selected()
            .and_then(|idx| self.visible_tasks.get(idx))
            .copied()
    }

    fn selected_task(&self) -> Option<&Task> {
        self.selected_id().and_then(|id| self.store.find_by_id(id))
    }

    fn set_status_message(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
    }

    /// Save the list and refresh the rows, reporting the outcome.
    fn save_and_report(&mut self, msg: String) {
        match self.store.save(&self.list_file) {
            Ok(()) => self.set_status_message(msg),
            Err(e) => self.set_status_message(format!("Error saving: {e}")),
        }
        self.update_visible_tasks();
    }

    /// Apply a lifecycle operation to the selected task.
    fn apply_to_selected(&mut self, op: fn(&mut Task) -> Result<()>, verb: &str) {
        let Some(id) = self.selected_id() else {
            self.set_status_message("No task selected");
            return;
        };
        match self.store.get_mut(id).and_then(op) {
            Ok(()) => self.save_and_report(format!("Task {id} {verb}")),
            Err(e) => self.set_status_message(e.to_string()),
        }
    }

    fn open_add_form(&mut self, parent: Option<u64>) {
        self.form_parent = parent;
        self.input = InputField::new();
        self.state = AppState::AddTask;
    }

    fn open_edit_form(&mut self) {
        let Some(task) = self.selected_task() else {
            self.set_status_message("No task selected");
            return;
        };
        if !task.is_incomplete() {
            let msg = format!("cannot edit task {}: it is {}", task.id(), task.state());
            self.set_status_message(msg);
            return;
        }
        self.input = InputField::with_value(task.description());
        self.state = AppState::EditTask;
    }

    fn submit_form(&mut self) {
        let text = self.input.value.trim_end().to_string();
        match self.state {
            AppState::AddTask => match self.store.create_task(text, self.form_parent) {
                Ok(id) => {
                    self.save_and_report(format!("Added task {id}"));
                    if !self.select_task(id) {
                        self.set_status_message(format!("Added task {id} (hidden by filters)"));
                    }
                }
                Err(e) => self.set_status_message(e.to_string()),
            },
            AppState::EditTask => {
                let Some(id) = self.selected_id() else {
                    self.state = AppState::TaskList;
                    return;
                };
                match self.store.get_mut(id).and_then(|t| t.edit_description(text)) {
                    Ok(()) => self.save_and_report(format!("Updated task {id}")),
                    Err(e) => self.set_status_message(e.to_string()),
                }
            }
            _ => {}
        }
        self.state = AppState::TaskList;
    }

    fn submit_range(&mut self) {
        let text = self.input.value.trim().to_string();
        match parse_range(&text, Local::now().date_naive()) {
            Some((from, to)) => {
                self.filter.range = DateRange::from_days(from, to);
                self.range_text = text;
                self.update_visible_tasks();
                self.set_status_message(if self.range_text.is_empty() {
                    "Date range cleared".to_string()
                } else {
                    format!("Date range applied ({} tasks)", self.visible_tasks.len())
                });
                self.state = AppState::TaskList;
            }
            None => self.set_status_message(format!(
                "Unrecognised range '{text}'. Use FROM..TO with YYYY-MM-DD, 'today' or 'Nd ago'"
            )),
        }
    }

    fn toggle_status(&mut self, state: State) {
        self.filter.status.toggle(state);
        self.update_visible_tasks();
        let shown = if self.filter.status.matches(state) { "Showing" } else { "Hiding" };
        self.set_status_message(format!("{shown} {state} tasks ({} visible)", self.visible_tasks.len()));
    }

    fn jump_to_parent(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        match self.store.parent_of(id) {
            Ok(Some(parent)) => {
                let pid = parent.id();
                if self.select_task(pid) {
                    self.set_status_message(format!("Navigated to parent task #{pid}"));
                } else {
                    self.set_status_message(format!("Parent task #{pid} is hidden by filters"));
                }
            }
            Ok(None) => self.set_status_message("No parent task"),
            Err(e) => self.set_status_message(e.to_string()),
        }
    }

    fn jump_to_first_child(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        let first_visible = self
            .store
            .children_of(id)
            .into_iter()
            .map(Task::id)
            .find(|cid| self.visible_tasks.contains(cid));
        match first_visible {
            Some(cid) => {
                self.select_task(cid);
                self.set_status_message(format!("Navigated to child task #{cid}"));
            }
            None => self.set_status_message("No visible child tasks"),
        }
    }

    /// Handle keyboard input when in the task list view.
    ///
    /// Returns true if the application should quit.
    fn handle_task_list_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(selected) = self.task_list_state.selected() {
                    if selected > 0 {
                        self.task_list_state.select(Some(selected - 1));
                    }
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(selected) = self.task_list_state.selected() {
                    if selected + 1 < self.visible_tasks.len() {
                        self.task_list_state.select(Some(selected + 1));
                    }
                }
            }
            KeyCode::Char('a') => self.open_add_form(None),
            KeyCode::Char('A') => match self.selected_id() {
                Some(id) => self.open_add_form(Some(id)),
                None => self.set_status_message("No task selected"),
            },
            KeyCode::Char('e') => self.open_edit_form(),
            KeyCode::Char('c') => self.apply_to_selected(Task::complete, "completed"),
            KeyCode::Char('x') => self.apply_to_selected(Task::cancel, "cancelled"),
            KeyCode::Char('o') => self.apply_to_selected(Task::incomplete, "reopened"),
            KeyCode::Char('r') => self.apply_to_selected(Task::reassign, "reassigned"),
            KeyCode::Char('p') | KeyCode::Left => self.jump_to_parent(),
            KeyCode::Right => self.jump_to_first_child(),
            KeyCode::Char('1') => self.toggle_status(State::Incomplete),
            KeyCode::Char('2') => self.toggle_status(State::Completed),
            KeyCode::Char('3') => self.toggle_status(State::Cancelled),
            KeyCode::Char('/') => {
                self.input = InputField::with_value(&self.range_text);
                self.state = AppState::DateRange;
            }
            KeyCode::Char('R') => match TaskStore::open(&self.list_file) {
                Ok(store) => {
                    self.store = store;
                    self.update_visible_tasks();
                    self.set_status_message("Tasks reloaded");
                }
                Err(e) => self.set_status_message(format!("Reload failed: {e}")),
            },
            KeyCode::Char('h') | KeyCode::Char('?') => self.state = AppState::Help,
            _ => {}
        }
        false
    }

    /// Handle keyboard input in the description form and the range prompt.
    fn handle_text_input(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        match key {
            KeyCode::Esc => {
                self.state = AppState::TaskList;
                self.set_status_message("Cancelled");
            }
            KeyCode::Enter if modifiers.contains(KeyModifiers::ALT) && self.state != AppState::DateRange => {
                self.input.handle_char('\n');
            }
            KeyCode::Enter => {
                if self.state == AppState::DateRange {
                    self.submit_range();
                } else {
                    self.submit_form();
                }
            }
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Delete => self.input.handle_delete(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            KeyCode::Home => self.input.move_cursor_home(),
            KeyCode::End => self.input.move_cursor_end(),
            KeyCode::Char(c) => self.input.handle_char(c),
            _ => {}
        }
    }

    /// Dispatch one key press. Returns true if the application should quit.
    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        self.status_message.clear();
        match self.state {
            AppState::TaskList => return self.handle_task_list_input(key, modifiers),
            AppState::AddTask | AppState::EditTask | AppState::DateRange => {
                self.handle_text_input(key, modifiers)
            }
            AppState::Help => {
                if matches!(key, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('h')) {
                    self.state = AppState::TaskList;
                }
            }
        }
        false
    }

    /// Poll for and handle keyboard events.
    ///
    /// Returns true if the application should quit.
    fn handle_input(&mut self) -> io::Result<bool> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(self.handle_key(key.code, key.modifiers));
                }
            }
        }
        Ok(false)
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let check = |on: bool| if on { "[x]" } else { "[ ]" };
        let status = self.filter.status;
        let range = if self.range_text.is_empty() { "any" } else { self.range_text.as_str() };
        let context = format!(
            "{} incomplete  {} completed  {} cancelled  Started: {}",
            check(status.incomplete),
            check(status.completed),
            check(status.cancelled),
            range
        );
        let header_text = vec![Line::from(vec![
            Span::styled("TO-DO LIST", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(
                context,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
            ),
        ])];

        let header = Paragraph::new(header_text)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        f.render_widget(header, area);
    }

    /// Render the task table fed by the store's filtered traversal.
    fn render_task_list(&mut self, f: &mut Frame, area: Rect) {
        let header = Row::new(["Status", "Task"].map(|h| {
            Cell::from(h).style(Style::default().add_modifier(Modifier::BOLD))
        }))
        .style(Style::default().bg(DARK_GREEN).fg(Color::White))
        .height(1);

        let rows: Vec<Row> = self
            .visible_tasks
            .iter()
            .filter_map(|&id| self.store.find_by_id(id))
            .map(|task| {
                let mut style = Style::default().fg(state_color(task.state()));
                if task.is_completed() {
                    style = style.add_modifier(Modifier::CROSSED_OUT);
                }
                let indent = "  ".repeat(self.store.depth_of(task.id()));
                Row::new(vec![
                    Cell::from(task.state().to_string()),
                    Cell::from(format!("{indent}{}", task.summary_label())),
                ])
                .style(style)
            })
            .collect();

        let widths = [Constraint::Length(11), Constraint::Min(20)];
        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "Tasks ({}/{}) - Press 'h' for help",
                self.visible_tasks.len(),
                self.store.len()
            )))
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");

        f.render_stateful_widget(table, area, &mut self.task_list_state);
    }

    /// Render the selected task: label, times, relations and full description.
    fn render_task_detail(&self, f: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Details");
        let Some(task) = self.selected_task() else {
            f.render_widget(Paragraph::new("No task selected").block(block), area);
            return;
        };

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let parent = self
            .store
            .parent_of(task.id())
            .ok()
            .flatten()
            .map(Task::summary_label)
            .unwrap_or_else(|| "-".into());
        let children = self.store.children_of(task.id()).len();
        let siblings = self.store.siblings_of(task.id()).map_or(0, |s| s.len());

        let mut lines = vec![
            Line::from(Span::styled(task.summary_label(), bold)),
            Line::from(""),
            Line::from(vec![
                Span::styled("Status:   ", bold),
                Span::styled(task.state().to_string(), Style::default().fg(state_color(task.state()))),
            ]),
            Line::from(task.time_range_label()),
            Line::from(vec![Span::styled("Parent:   ", bold), Span::raw(parent)]),
            Line::from(vec![
                Span::styled("Children: ", bold),
                Span::raw(children.to_string()),
                Span::styled("  Siblings: ", bold),
                Span::raw(siblings.to_string()),
            ]),
            Line::from(""),
        ];
        lines.extend(task.description().lines().map(|l| Line::from(l.to_string())));

        let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
        f.render_widget(paragraph, area);
    }

    /// Render the description form or the date range prompt as a popup.
    fn render_input_popup(&self, f: &mut Frame, area: Rect) {
        let (title, percent_y) = match self.state {
            AppState::AddTask => match self.form_parent {
                Some(pid) => (format!("New subtask of #{pid} (Enter save, Alt+Enter newline, Esc cancel)"), 40),
                None => ("New task (Enter save, Alt+Enter newline, Esc cancel)".to_string(), 40),
            },
            AppState::EditTask => (
                format!(
                    "Edit task #{} (Enter save, Alt+Enter newline, Esc cancel)",
                    self.selected_id().unwrap_or(0)
                ),
                40,
            ),
            _ => ("Start date range FROM..TO (empty clears)".to_string(), 20),
        };

        let area = centered_rect(60, percent_y, area);
        f.render_widget(Clear, area);
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .style(Style::default().bg(DARK_PURPLE));
        let lines: Vec<Line> = self.input.value.split('\n').map(|l| Line::from(l.to_string())).collect();
        f.render_widget(Paragraph::new(lines).block(block), area);

        let (line, col) = self.input.cursor_line_col();
        f.set_cursor_position((area.x + 1 + col as u16, area.y + 1 + line as u16));
    }

    fn render_help(&self, f: &mut Frame, area: Rect) {
        let area = centered_rect(60, 70, area);
        f.render_widget(Clear, area);
        let help = [
            ("Up/Down, j/k", "Move selection"),
            ("a", "Add task"),
            ("A", "Add subtask of selected"),
            ("e", "Edit description (incomplete only)"),
            ("c", "Complete"),
            ("x", "Cancel"),
            ("o", "Reopen a completed task"),
            ("r", "Reassign a cancelled task"),
            ("p, Left", "Go to parent"),
            ("Right", "Go to first child"),
            ("1 / 2 / 3", "Toggle incomplete / completed / cancelled"),
            ("/", "Filter by start date range"),
            ("R", "Reload list file"),
            ("q, Esc", "Quit"),
        ];
        let lines: Vec<Line> = help
            .iter()
            .map(|(keys, what)| {
                Line::from(vec![
                    Span::styled(format!("{keys:<14}"), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(*what),
                ])
            })
            .collect();
        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .title("Help (Esc to close)")
                .borders(Borders::ALL)
                .style(Style::default().bg(DARK_PURPLE)),
        );
        f.render_widget(paragraph, area);
    }

    /// Render the status bar at the bottom of the screen.
    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let status_text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else {
            match self.state {
                AppState::TaskList => format!(
                    "{} | Tasks: {} | Press 'h' for help",
                    self.list_file.display(),
                    self.visible_tasks.len()
                ),
                AppState::AddTask => "Add New Task".to_string(),
                AppState::EditTask => "Edit Task".to_string(),
                AppState::DateRange => "Date Range".to_string(),
                AppState::Help => "Help".to_string(),
            }
        };
        let status = Paragraph::new(status_text)
            .style(Style::default().bg(DARK_GREEN).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    /// Main render function: header, list and detail side by side, status bar.
    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
            .split(f.area());
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        self.render_header(f, chunks[0]);
        self.render_task_list(f, body[0]);
        self.render_task_detail(f, body[1]);
        if self.state.is_text_entry() {
            self.render_input_popup(f, chunks[1]);
        } else if self.state == AppState::Help {
            self.render_help(f, chunks[1]);
        }
        self.render_status_bar(f, chunks[2]);
    }

    /// Main event loop for the TUI application.
    ///
    /// Handles rendering and input processing until the user exits.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

/// Parse `FROM..TO` where either side may be empty. A lone date means that day only.
/// Empty input clears the range.
pub fn parse_range(text: &str, today: NaiveDate) -> Option<(Option<NaiveDate>, Option<NaiveDate>)> {
    let text = text.trim();
    if text.is_empty() {
        return Some((None, None));
    }
    let side = |s: &str| -> Option<Option<NaiveDate>> {
        let s = s.trim();
        if s.is_empty() {
            Some(None)
        } else {
            parse_date_input(s, today).map(Some)
        }
    };
    match text.split_once("..") {
        Some((from, to)) => Some((side(from)?, side(to)?)),
        None => {
            let day = parse_date_input(text, today)?;
            Some((Some(day), Some(day)))
        }
    }
}
