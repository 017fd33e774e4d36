//! File-backed event log.
//!
//! One file per run, named after the startup time
//! (`<log_dir>/2026-10-18 14-03-59.txt`). Each line is written as
//! `[HH:MM:SS] message\r\n` and, while echo is enabled, also printed to the
//! console.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use relay_core::timestamp::stamp;
use relay_core::{LogSink, RelayError};

const FILE_NAME_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<File>,
    echo: AtomicBool,
}

impl FileLogSink {
    /// Creates `dir` if needed and opens the log file for this run.
    ///
    /// # Errors
    ///
    /// [`RelayError::StorageFailure`] if the directory or file cannot be
    /// created. The caller treats this as fatal at startup.
    pub fn create(dir: &Path, started: DateTime<Local>, echo: bool) -> Result<Self, RelayError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            RelayError::StorageFailure(format!("cannot create {}: {e}", dir.display()))
        })?;

        let path = dir.join(format!("{}.txt", started.format(FILE_NAME_FORMAT)));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                RelayError::StorageFailure(format!("cannot open {}: {e}", path.display()))
            })?;

        info!("event log at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
            echo: AtomicBool::new(echo),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo.load(Ordering::Relaxed)
    }

    /// Flips console echo and returns the new setting.
    pub fn toggle_echo(&self) -> bool {
        !self.echo.fetch_xor(true, Ordering::Relaxed)
    }

    /// Removes every file in the log directory except the active log.
    ///
    /// Returns how many files were deleted. Subdirectories are left alone.
    pub fn delete_previous_logs(&self) -> Result<usize, RelayError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let entries = std::fs::read_dir(dir).map_err(|e| {
            RelayError::StorageFailure(format!("cannot list {}: {e}", dir.display()))
        })?;

        let mut deleted = 0;
        for entry in entries {
            let entry = entry.map_err(|e| RelayError::StorageFailure(e.to_string()))?;
            let path = entry.path();
            if path == self.path || !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path).map_err(|e| {
                RelayError::StorageFailure(format!("cannot delete {}: {e}", path.display()))
            })?;
            debug!("deleted old log {}", path.display());
            deleted += 1;
        }
        Ok(deleted)
    }
}

impl LogSink for FileLogSink {
    fn append(&self, line: &str) -> Result<(), RelayError> {
        let stamped = stamp(line);
        {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            write!(file, "{stamped}\r\n")
                .and_then(|()| file.flush())
                .map_err(|e| RelayError::StorageFailure(e.to_string()))?;
        }
        if self.echo_enabled() {
            println!("{stamped}");
        }
        Ok(())
    }
}
