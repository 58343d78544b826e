use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Hierarchical to-do list manager.
/// Storage defaults to ~/.todo/todo.json or a path passed via --file.
#[derive(Parser)]
#[command(name = "todo", version, about = "Hierarchical to-do list manager")]
pub struct Cli {
    /// Path to the JSON list file.
    #[arg(long, short, global = true, env = "TODO_FILE")]
    pub file: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
