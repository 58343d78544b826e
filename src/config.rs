//! Location of the list file and its companion directories.
//!
//! The list file defaults to `~/.todo/todo.json`; `--file` or the
//! `TODO_FILE` environment variable point elsewhere, in which case backups
//! are kept next to that file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TodoError};

pub const DATA_DIR_NAME: &str = ".todo";
pub const LIST_FILE_NAME: &str = "todo.json";
pub const BACKUP_DIR_NAME: &str = "backup";

/// Resolved file locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub list_file: PathBuf,
}

impl Config {
    /// Resolve from an explicit file, falling back to `$HOME/.todo/todo.json`.
    pub fn resolve(file: Option<PathBuf>) -> Result<Self> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Config::resolve_with(file, home)
    }

    pub fn resolve_with(file: Option<PathBuf>, home: Option<PathBuf>) -> Result<Self> {
        let config = match file {
            Some(list_file) => {
                let data_dir = list_file
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf();
                Config {
                    data_dir,
                    list_file,
                }
            }
            None => {
                let data_dir = home
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(DATA_DIR_NAME);
                Config {
                    list_file: data_dir.join(LIST_FILE_NAME),
                    data_dir,
                }
            }
        };

        fs::create_dir_all(&config.data_dir).map_err(|source| TodoError::Io {
            path: config.data_dir.clone(),
            source,
        })?;
        Ok(config)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR_NAME)
    }
}
