//! # todo - Hierarchical To-Do List Manager
//!
//! A small to-do list manager with nested tasks, a strict task lifecycle and
//! both a command-line and a terminal user interface (TUI).
//!
//! ## Key Features
//!
//! - **Hierarchical Tasks**: any task can be the parent of others
//! - **Explicit Lifecycle**: incomplete → completed or cancelled; completed tasks can be
//!   reopened and cancelled tasks reassigned with a fresh start time
//! - **Filtered Views**: toggle each lifecycle state and restrict by start date
//! - **Single JSON File**: the whole list lives in one human-readable file that can be
//!   exported, imported and backed up
//!
//! ## Quick Start
//!
//! ```bash
//! # Add a task and a subtask
//! todo add "Plan trip"
//! todo add "Book flights" --parent 1
//!
//! # List open tasks as a tree
//! todo list --incomplete --tree
//!
//! # Finish, cancel, bring back
//! todo complete 2
//! todo cancel 1
//! todo reassign 1
//!
//! # Launch the TUI
//! todo ui
//! ```
//!
//! Data is stored in `~/.todo/todo.json` unless `--file` or `TODO_FILE` says otherwise.

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod fields;
pub mod store;
pub mod task;
pub mod tui {
    pub mod app;
    pub mod colors;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod utils;
}

use cli::Cli;
use cmd::*;
use config::Config;
use error::Result;
use store::TaskStore;

/// Send `tracing` output to stderr; `RUST_LOG` overrides the default level.
/// The TUI owns the terminal, so logging is off while it runs.
fn init_logging(verbose: bool, tui: bool) {
    let filter = if tui {
        EnvFilter::new("off")
    } else {
        let default_level = if verbose { "debug" } else { "warn" };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.file)?;
    tracing::debug!(list_file = %config.list_file.display(), "resolved configuration");

    // Commands that never touch the list contents
    let command = match cli.command {
        Commands::Completions { shell } => {
            cmd_completions(shell);
            return Ok(());
        }
        Commands::Backup => return cmd_backup(&config),
        command => command,
    };

    let mut store = TaskStore::open(&config.list_file)?;
    let list_file = config.list_file.as_path();

    match command {
        Commands::Backup | Commands::Completions { .. } => Ok(()),
        Commands::Ui => cmd_ui(store, list_file),
        Commands::Add { description, parent } => cmd_add(&mut store, list_file, description, parent),
        Commands::List {
            incomplete,
            completed,
            cancelled,
            from,
            to,
            tree,
        } => {
            cmd_list(&store, incomplete, completed, cancelled, from, to, tree);
            Ok(())
        }
        Commands::View { id } => cmd_view(&store, id),
        Commands::Edit { id, description } => cmd_edit(&mut store, list_file, id, description),
        Commands::Complete { id } => cmd_complete(&mut store, list_file, id),
        Commands::Cancel { id } => cmd_cancel(&mut store, list_file, id),
        Commands::Reopen { id } => cmd_reopen(&mut store, list_file, id),
        Commands::Reassign { id } => cmd_reassign(&mut store, list_file, id),
        Commands::Export { output } => cmd_export(&store, output),
        Commands::Import { input, no_backup } => cmd_import(&mut store, &config, &input, no_backup),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Commands::Ui));

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
