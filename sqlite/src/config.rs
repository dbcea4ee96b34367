//! Open options and store configuration.
//!
//! [`OpenOptions`] controls how a single database file is opened: journal
//! mode, synchronous and locking pragmas, and the two-level busy policy.
//! [`StoreConfig`] bundles the options with the paths of a master and
//! transaction database pair and backup settings, and is loaded from YAML.
//!
//! # Example YAML
//!
//! ```yaml
//! master_path: data/master.db
//! transaction_path: data/transactions.db
//! open:
//!   journal_mode: wal
//!   synchronous_off: false
//!   exclusive: false
//!   busy:
//!     handler_timeout_ms: 1000
//!     retry_attempts: 100
//!     retry_sleep_ms: 1000
//! backup:
//!   pages_per_step: 100
//!   pause_ms: 250
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Journal mode applied at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead log.
    #[default]
    Wal,
    /// No rollback journal.
    Off,
    /// Leave the engine's default (rollback journal) untouched.
    Default,
}

impl JournalMode {
    pub(crate) fn pragma_value(self) -> Option<&'static str> {
        match self {
            JournalMode::Wal => Some("WAL"),
            JournalMode::Off => Some("OFF"),
            JournalMode::Default => None,
        }
    }
}

/// Two-level busy handling.
///
/// The engine's own busy handler waits up to `handler_timeout_ms` on each
/// step. When that still ends in a busy condition, [`Connection::execute`]
/// retries the whole statement `retry_attempts` times, sleeping
/// `retry_sleep_ms` between attempts, but only while auto-committing.
///
/// [`Connection::execute`]: crate::Connection::execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusyPolicy {
    pub handler_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_sleep_ms: u64,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 1000,
            retry_attempts: 100,
            retry_sleep_ms: 1000,
        }
    }
}

impl BusyPolicy {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep_ms)
    }
}

/// How a database file is opened.
///
/// # Examples
///
/// ```
/// use rdb_sqlite::{JournalMode, OpenOptions};
///
/// let opts = OpenOptions::default();
/// assert_eq!(opts.journal_mode, JournalMode::Wal);
/// assert!(!opts.exclusive);
///
/// let fast = OpenOptions {
///     journal_mode: JournalMode::Off,
///     synchronous_off: true,
///     ..OpenOptions::default()
/// };
/// assert!(fast.synchronous_off);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OpenOptions {
    pub journal_mode: JournalMode,
    /// `PRAGMA synchronous = OFF`.
    pub synchronous_off: bool,
    /// `PRAGMA locking_mode = EXCLUSIVE`.
    pub exclusive: bool,
    pub read_only: bool,
    pub busy: BusyPolicy,
}

/// Chunking for online backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub pages_per_step: i32,
    pub pause_ms: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            pages_per_step: 100,
            pause_ms: 250,
        }
    }
}

/// Storage configuration loaded from YAML.
///
/// # Examples
///
/// ```no_run
/// use rdb_sqlite::StoreConfig;
///
/// let config = StoreConfig::load("rdb.yml").unwrap();
/// if let Some(master) = &config.master_path {
///     println!("master database: {}", master.display());
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub master_path: Option<PathBuf>,
    pub transaction_path: Option<PathBuf>,
    pub open: OpenOptions,
    pub backup: BackupSettings,
}

impl StoreConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::StoreError::Io) if the file cannot be read, or
    /// [`Config`](crate::StoreError::Config) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
