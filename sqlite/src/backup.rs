//! Online backup to a file.
//!
//! The source stays usable while pages are copied in chunks. Between chunks
//! the caller's stop predicate is polled and its progress callback receives
//! `(remaining, total)` page counts.
//!
//! # Example
//!
//! ```no_run
//! use rdb_sqlite::{BackupOptions, BackupOutcome, Connection};
//!
//! let conn = Connection::open("data/members.db", &Default::default()).unwrap();
//! let outcome = conn
//!     .backup_to(
//!         "backups/members.db",
//!         || false,
//!         |remaining, total| println!("{remaining}/{total} pages left"),
//!         &BackupOptions::default(),
//!     )
//!     .unwrap();
//! assert_eq!(outcome, BackupOutcome::Completed);
//! ```

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::backup::{Backup, StepResult};
use tracing::{debug, info};

use crate::config::BackupSettings;
use crate::connection::Connection;
use crate::error::{Result, StoreError};

/// Chunk size and pause between chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub pages_per_step: i32,
    pub pause: Duration,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self::from(&BackupSettings::default())
    }
}

impl From<&BackupSettings> for BackupOptions {
    fn from(settings: &BackupSettings) -> Self {
        Self {
            pages_per_step: settings.pages_per_step,
            pause: Duration::from_millis(settings.pause_ms),
        }
    }
}

/// How a backup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed,
    /// The stop predicate returned true before the copy finished.
    Stopped,
}

impl Connection {
    /// Copies this database into the file at `dest`, creating its parent
    /// directories.
    pub fn backup_to(
        &self,
        dest: impl AsRef<Path>,
        mut should_stop: impl FnMut() -> bool,
        mut progress: impl FnMut(i32, i32),
        options: &BackupOptions,
    ) -> Result<BackupOutcome> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = dest.display().to_string();
        let mut target = rusqlite::Connection::open(dest)
            .map_err(|e| StoreError::from(e).context(file.clone()))?;
        let backup = Backup::new(self.inner(), &mut target)
            .map_err(|e| StoreError::from(e).context(file.clone()))?;

        loop {
            if should_stop() {
                info!(dest = %file, "backup stopped");
                return Ok(BackupOutcome::Stopped);
            }
            let step = backup
                .step(options.pages_per_step)
                .map_err(|e| StoreError::from(e).context(file.clone()))?;
            let state = backup.progress();
            progress(state.remaining, state.pagecount);
            match step {
                StepResult::Done => {
                    info!(dest = %file, pages = state.pagecount, "backup completed");
                    return Ok(BackupOutcome::Completed);
                }
                _ => {
                    debug!(remaining = state.remaining, total = state.pagecount, "backup step");
                    thread::sleep(options.pause);
                }
            }
        }
    }
}
