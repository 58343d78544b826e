//! Command implementations for the CLI interface.
//!
//! This module contains the command handlers behind each subcommand. Every
//! mutating handler applies its change to the opened store and saves the list
//! file before reporting back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, TimeZone};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, TodoError};
use crate::fields::{parse_date_input, DateRange, StatusFilter, TaskFilter};
use crate::store::TaskStore;
use crate::task::Task;
use crate::tui::run::run_tui;

const DEFAULT_EXPORT_FILE: &str = "todo.json";
const STARTED_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive UI interface.
    Ui,

    /// Add a new task.
    Add {
        /// What needs doing.
        description: String,
        /// Parent task ID.
        #[arg(long)]
        parent: Option<u64>,
    },

    /// List tasks with optional filters.
    List {
        /// Include incomplete tasks.
        #[arg(long)]
        incomplete: bool,
        /// Include completed tasks.
        #[arg(long)]
        completed: bool,
        /// Include cancelled tasks.
        #[arg(long)]
        cancelled: bool,
        /// Only tasks started on or after this day: YYYY-MM-DD, "today", "yesterday", "Nd ago", "Nw ago".
        #[arg(long, value_parser = parse_day)]
        from: Option<NaiveDate>,
        /// Only tasks started on or before this day.
        #[arg(long, value_parser = parse_day)]
        to: Option<NaiveDate>,
        /// Render as a tree across parent-child relationships.
        #[arg(long)]
        tree: bool,
    },

    /// View a single task with its parent, children and siblings.
    View {
        /// Task ID to view
        id: u64,
    },

    /// Replace the description of an incomplete task.
    Edit {
        /// Task ID to edit
        id: u64,
        /// New description.
        description: String,
    },

    /// Mark a task done.
    Complete {
        /// Task ID to complete
        id: u64,
    },

    /// Cancel an incomplete task.
    Cancel {
        /// Task ID to cancel
        id: u64,
    },

    /// Reopen a completed task.
    Reopen {
        /// Task ID to reopen
        id: u64,
    },

    /// Bring a cancelled task back with a fresh start time.
    Reassign {
        /// Task ID to reassign
        id: u64,
    },

    /// Write the whole list to a JSON file.
    Export {
        /// Output file path (default: todo.json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace the whole list with the contents of a JSON file.
    Import {
        /// Input JSON file path
        input: PathBuf,
        /// Skip creating backup before import
        #[arg(long)]
        no_backup: bool,
    },

    /// Create timestamped backup of the list file.
    Backup,

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Clap value parser for the `--from`/`--to` day arguments.
fn parse_day(s: &str) -> std::result::Result<NaiveDate, String> {
    parse_date_input(s, Local::now().date_naive()).ok_or_else(|| {
        format!("unrecognised date '{s}'. Use YYYY-MM-DD, 'today', 'yesterday', 'Nd ago' or 'Nw ago'")
    })
}

/// Launch the terminal user interface on an opened list.
pub fn cmd_ui(store: TaskStore, list_file: &Path) -> Result<()> {
    run_tui(store, list_file).map_err(|source| TodoError::Io {
        path: list_file.to_path_buf(),
        source,
    })
}

/// Add a new task to the list.
pub fn cmd_add(
    store: &mut TaskStore,
    list_file: &Path,
    description: String,
    parent: Option<u64>,
) -> Result<()> {
    let id = store.create_task(description, parent)?;
    store.save(list_file)?;
    println!("Added task {id}");
    Ok(())
}

/// List tasks with optional status and start-date filtering.
pub fn cmd_list(
    store: &TaskStore,
    incomplete: bool,
    completed: bool,
    cancelled: bool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    tree: bool,
) {
    let filter = TaskFilter {
        status: StatusFilter::from_flags(incomplete, completed, cancelled),
        range: DateRange::from_days(from, to),
    };
    print!("{}", format_list(store, &filter, tree, &Local));
}

/// Collect the tasks matching `filter` and render them with `format_table`.
pub fn format_list<Tz>(store: &TaskStore, filter: &TaskFilter, tree: bool, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut tasks = Vec::new();
    store.for_each(filter, |t| tasks.push(t));
    debug!(shown = tasks.len(), total = store.len(), "listing tasks");
    format_table(store, &tasks, tree, tz)
}

/// Render listed tasks as a table with optional tree indentation.
pub fn format_table<Tz>(store: &TaskStore, tasks: &[&Task], tree: bool, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = format!("{:<11} {:<16} {}\n", "Status", "Started", "Task");
    for t in tasks {
        let indent = if tree { "  ".repeat(store.depth_of(t.id())) } else { String::new() };
        let started = tz
            .timestamp_millis_opt(t.start())
            .single()
            .map(|dt| dt.format(STARTED_FORMAT).to_string())
            .unwrap_or_else(|| "-".into());
        out.push_str(&format!(
            "{:<11} {:<16} {}{}\n",
            t.state(),
            started,
            indent,
            t.summary_label()
        ));
    }
    out
}

/// View detailed information about a specific task.
pub fn cmd_view(store: &TaskStore, id: u64) -> Result<()> {
    print!("{}", format_details(store, id, &Local)?);
    Ok(())
}

pub fn format_details<Tz>(store: &TaskStore, id: u64, tz: &Tz) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let task = store.get(id)?;
    let labels = |tasks: Vec<&Task>| {
        if tasks.is_empty() {
            "-".to_string()
        } else {
            tasks.iter().map(|t| t.summary_label()).collect::<Vec<_>>().join(", ")
        }
    };
    let parent = store
        .parent_of(id)?
        .map(Task::summary_label)
        .unwrap_or_else(|| "-".into());

    let mut out = String::new();
    out.push_str(&format!("Task:         {}\n", task.summary_label()));
    out.push_str(&format!("Status:       {}\n", task.state()));
    out.push_str(&format!("Time:         {}\n", task.time_range_label_in(tz)));
    out.push_str(&format!("Parent:       {parent}\n"));
    out.push_str(&format!("Children:     {}\n", labels(store.children_of(id))));
    out.push_str(&format!("Siblings:     {}\n", labels(store.siblings_of(id)?)));
    let description = if task.description().trim().is_empty() { "-" } else { task.description() };
    out.push_str(&format!("Description:\n{description}\n"));
    Ok(out)
}

/// Replace a task's description.
pub fn cmd_edit(store: &mut TaskStore, list_file: &Path, id: u64, description: String) -> Result<()> {
    store.get_mut(id)?.edit_description(description)?;
    store.save(list_file)?;
    println!("Updated task {id}");
    Ok(())
}

/// Mark a task done.
pub fn cmd_complete(store: &mut TaskStore, list_file: &Path, id: u64) -> Result<()> {
    store.get_mut(id)?.complete()?;
    store.save(list_file)?;
    println!("Marked {id} done.");
    Ok(())
}

/// Cancel an incomplete task.
pub fn cmd_cancel(store: &mut TaskStore, list_file: &Path, id: u64) -> Result<()> {
    store.get_mut(id)?.cancel()?;
    store.save(list_file)?;
    println!("Cancelled {id}");
    Ok(())
}

/// Reopen a completed task.
pub fn cmd_reopen(store: &mut TaskStore, list_file: &Path, id: u64) -> Result<()> {
    store.get_mut(id)?.incomplete()?;
    store.save(list_file)?;
    println!("Reopened {id}");
    Ok(())
}

/// Reassign a cancelled task.
pub fn cmd_reassign(store: &mut TaskStore, list_file: &Path, id: u64) -> Result<()> {
    store.get_mut(id)?.reassign()?;
    store.save(list_file)?;
    println!("Reassigned {id}");
    Ok(())
}

/// Export the whole list to a JSON file.
pub fn cmd_export(store: &TaskStore, output: Option<PathBuf>) -> Result<()> {
    let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE));
    fs::write(&output_path, store.serialize()?).map_err(|source| TodoError::Io {
        path: output_path.clone(),
        source,
    })?;
    println!("Exported {} task(s) to {}", store.len(), output_path.display());
    Ok(())
}

/// Create a timestamped backup of the list file.
pub fn create_backup(list_file: &Path, backup_dir: &Path) -> Result<PathBuf> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| TodoError::Io { path, source }
    };
    if !list_file.exists() {
        return Err(TodoError::Io {
            path: list_file.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "list file does not exist"),
        });
    }

    fs::create_dir_all(backup_dir).map_err(io_err(backup_dir))?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
    let file_name = list_file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("todo.json");
    let mut backup_path = backup_dir.join(format!("{timestamp}_{file_name}"));
    let mut copy = 1;
    while backup_path.exists() {
        backup_path = backup_dir.join(format!("{timestamp}-{copy}_{file_name}"));
        copy += 1;
    }

    fs::copy(list_file, &backup_path).map_err(io_err(list_file))?;
    debug!(backup = %backup_path.display(), "backup created");
    Ok(backup_path)
}

/// Replace the list with an exported file, backing up the current one first.
pub fn cmd_import(store: &mut TaskStore, config: &Config, input: &Path, no_backup: bool) -> Result<()> {
    if !no_backup && config.list_file.exists() {
        let backup_path = create_backup(&config.list_file, &config.backup_dir())?;
        println!("Created backup: {}", backup_path.display());
    }

    let content = fs::read_to_string(input).map_err(|source| TodoError::Io {
        path: input.to_path_buf(),
        source,
    })?;
    store.load_str(&content)?;
    store.save(&config.list_file)?;
    println!("Imported {} task(s) from {}", store.len(), input.display());
    Ok(())
}

/// Back up the list file.
pub fn cmd_backup(config: &Config) -> Result<()> {
    if !config.list_file.exists() {
        warn!(path = %config.list_file.display(), "nothing to back up");
        println!("No list file yet, nothing to back up.");
        return Ok(());
    }
    let backup_path = create_backup(&config.list_file, &config.backup_dir())?;
    println!("Backup created: {}", backup_path.display());
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn sample_store() -> TaskStore {
        let mut store = TaskStore::new();
        // 2023-11-14 22:13:20 UTC
        let t0 = 1_700_000_000_000;
        store.create_task_at("Plan trip", None, t0).unwrap();
        store.create_task_at("Book flights", Some(1), t0 + 60_000).unwrap();
        store.create_task_at("Book hotel", Some(1), t0 + 120_000).unwrap();
        store
    }

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::resolve_with(Some(dir.path().join("todo.json")), None).unwrap();
        (dir, config)
    }

    #[test]
    fn test_parse_day_reports_bad_input() {
        assert!(parse_day("today").is_ok());
        assert!(parse_day("2024-02-30").is_err());
        assert!(parse_day("soon").unwrap_err().contains("soon"));
    }

    #[test]
    fn test_format_table_tree() {
        let mut store = sample_store();
        store.get_mut(3).unwrap().cancel().unwrap();
        let tasks: Vec<&Task> = store.iter().collect();

        let table = format_table(&store, &tasks, true, &Utc);
        let expected = "\
Status      Started          Task
incomplete  2023-11-14 22:13 [1] Plan trip
incomplete  2023-11-14 22:14   [2] Book flights
cancelled   2023-11-14 22:15   [3] Book hotel
";
        assert_eq!(table, expected);

        let flat = format_table(&store, &tasks, false, &Utc);
        assert!(flat.contains("22:14 [2] Book flights"));
    }

    #[test]
    fn test_format_list_applies_filters() {
        let mut store = sample_store();
        store.get_mut(2).unwrap().complete_at(1_700_000_300_000).unwrap();
        store.get_mut(3).unwrap().cancel().unwrap();

        let open_only = TaskFilter {
            status: StatusFilter::from_flags(true, false, false),
            range: DateRange::default(),
        };
        let listed = format_list(&store, &open_only, false, &Utc);
        assert_eq!(
            listed,
            "Status      Started          Task\nincomplete  2023-11-14 22:13 [1] Plan trip\n"
        );

        let done_or_dropped = TaskFilter {
            status: StatusFilter::from_flags(false, true, true),
            range: DateRange::default(),
        };
        let listed = format_list(&store, &done_or_dropped, true, &Utc);
        assert!(listed.contains("completed   2023-11-14 22:14   [2] Book flights\n"));
        assert!(listed.contains("cancelled   2023-11-14 22:15   [3] Book hotel\n"));
        assert!(!listed.contains("[1]"));

        let late = TaskFilter {
            status: StatusFilter::default(),
            range: DateRange::new(1_700_000_100_000, 0),
        };
        let listed = format_list(&store, &late, false, &Utc);
        assert_eq!(listed.lines().count(), 2);
        assert!(listed.contains("[3] Book hotel"));
    }

    #[test]
    fn test_format_details() {
        let store = sample_store();
        let details = format_details(&store, 2, &Utc).unwrap();
        let expected = "\
Task:         [2] Book flights
Status:       incomplete
Time:         Assigned on 2023-11-14 22:14. In progress.
Parent:       [1] Plan trip
Children:     -
Siblings:     [3] Book hotel
Description:
Book flights
";
        assert_eq!(details, expected);

        assert!(matches!(format_details(&store, 9, &Utc), Err(TodoError::NotFound(9))));
    }

    #[test]
    fn test_mutating_commands_save_the_list() {
        let (_dir, config) = temp_config();
        let mut store = TaskStore::new();

        cmd_add(&mut store, &config.list_file, "Buy milk".into(), None).unwrap();
        cmd_add(&mut store, &config.list_file, "Skimmed".into(), Some(1)).unwrap();
        cmd_edit(&mut store, &config.list_file, 2, "Semi-skimmed".into()).unwrap();
        cmd_complete(&mut store, &config.list_file, 1).unwrap();
        cmd_cancel(&mut store, &config.list_file, 2).unwrap();

        let saved = TaskStore::open(&config.list_file).unwrap();
        assert_eq!(saved, store);
        assert!(saved.get(1).unwrap().is_completed());
        assert!(saved.get(2).unwrap().is_cancelled());
        assert_eq!(saved.get(2).unwrap().description(), "Semi-skimmed");

        cmd_reopen(&mut store, &config.list_file, 1).unwrap();
        cmd_reassign(&mut store, &config.list_file, 2).unwrap();
        let saved = TaskStore::open(&config.list_file).unwrap();
        assert!(saved.get(1).unwrap().is_incomplete());
        assert!(saved.get(2).unwrap().is_incomplete());
    }

    #[test]
    fn test_failed_command_leaves_file_untouched() {
        let (_dir, config) = temp_config();
        let mut store = TaskStore::new();
        cmd_add(&mut store, &config.list_file, "x".into(), None).unwrap();
        let before = fs::read_to_string(&config.list_file).unwrap();

        assert!(matches!(
            cmd_reopen(&mut store, &config.list_file, 1),
            Err(TodoError::InvalidTransition { .. })
        ));
        assert!(matches!(
            cmd_add(&mut store, &config.list_file, "y".into(), Some(7)),
            Err(TodoError::NotFound(7))
        ));
        assert_eq!(fs::read_to_string(&config.list_file).unwrap(), before);
    }

    #[test]
    fn test_export_then_import_replaces_list() {
        let (dir, config) = temp_config();
        let exported = dir.path().join("export.json");

        let source = sample_store();
        cmd_export(&source, Some(exported.clone())).unwrap();

        let mut store = TaskStore::new();
        cmd_add(&mut store, &config.list_file, "will be replaced".into(), None).unwrap();
        cmd_import(&mut store, &config, &exported, false).unwrap();

        assert_eq!(store, source);
        assert_eq!(TaskStore::open(&config.list_file).unwrap(), source);

        let backups: Vec<_> = fs::read_dir(config.backup_dir()).unwrap().collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_import_malformed_keeps_current_list() {
        let (dir, config) = temp_config();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"[{"id": 1, "pid": 0, "desc": "x", "start": 100}]"#).unwrap();

        let mut store = sample_store();
        store.save(&config.list_file).unwrap();

        let err = cmd_import(&mut store, &config, &bad, true).unwrap_err();
        assert!(matches!(err, TodoError::MalformedRecord { id: Some(1), .. }));
        assert_eq!(store, sample_store());
        assert_eq!(TaskStore::open(&config.list_file).unwrap(), sample_store());
        assert!(!config.backup_dir().exists());
    }

    #[test]
    fn test_backup_requires_existing_file() {
        let (_dir, config) = temp_config();
        assert!(create_backup(&config.list_file, &config.backup_dir()).is_err());
        cmd_backup(&config).unwrap();

        sample_store().save(&config.list_file).unwrap();
        let backup = create_backup(&config.list_file, &config.backup_dir()).unwrap();
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            fs::read_to_string(&config.list_file).unwrap()
        );
    }

    #[test]
    fn test_back_to_back_backups_are_all_kept() {
        let (_dir, config) = temp_config();
        sample_store().save(&config.list_file).unwrap();

        let backups: Vec<PathBuf> = (0..3)
            .map(|_| create_backup(&config.list_file, &config.backup_dir()).unwrap())
            .collect();
        assert_ne!(backups[0], backups[1]);
        assert_ne!(backups[1], backups[2]);
        assert_eq!(fs::read_dir(config.backup_dir()).unwrap().count(), 3);
    }
}
