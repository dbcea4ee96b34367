//! Error types for the storage layer.
//!
//! Every fallible operation returns [`StoreError`]. Native engine failures
//! keep the extended result code and message, and call sites attach the SQL
//! text or file name they were working on as context.

use rdb_core::IdError;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Native engine failure not otherwise classified.
    #[error("engine error {code}: {message}{}", context_suffix(.context))]
    Engine {
        /// Extended result code, or `-1` when the failure did not come from the engine.
        code: i32,
        message: String,
        /// SQL text, file name or operation that failed.
        context: Option<String>,
    },

    /// Busy retries were exhausted while the connection was auto-committing.
    #[error("lock timeout after {attempts} attempts: {sql}")]
    LockTimeout { sql: String, attempts: u32 },

    /// Lock conflict inside an explicit transaction; not retried.
    #[error("database locked inside an explicit transaction: {sql}")]
    Locked { sql: String },

    /// Bind by name to a parameter the statement does not declare.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Identifier text or hex could not be parsed.
    #[error(transparent)]
    InvalidFormat(#[from] IdError),

    /// A catalog object could not be created while opening the database.
    #[error("schema inconsistent at object '{object}': {message}")]
    SchemaInconsistent { object: String, message: String },

    /// Result set has no column with this name.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// Column or parameter index outside the valid range.
    #[error("index {index} out of bounds ({count} available)")]
    IndexOutOfBounds { index: usize, count: usize },

    /// Stored value cannot be read as the requested type.
    #[error("type mismatch in column '{column}': {message}")]
    TypeMismatch { column: String, message: String },

    /// Operation on a database that is not open.
    #[error("database is closed")]
    Closed,

    /// A table failed to migrate. Tables listed in `migrated` were already copied.
    #[error("migration of table '{table}' failed: {source}")]
    MigrationFailed {
        table: String,
        migrated: Vec<String>,
        #[source]
        source: Box<StoreError>,
    },

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// JSON rendering failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(" (in: {c})"))
        .unwrap_or_default()
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(native, message) => StoreError::Engine {
                code: native.extended_code,
                message: message.unwrap_or_else(|| native.to_string()),
                context: None,
            },
            other => StoreError::Engine {
                code: -1,
                message: other.to_string(),
                context: None,
            },
        }
    }
}

impl StoreError {
    /// Attaches context to an [`Engine`](StoreError::Engine) error; other
    /// variants are returned unchanged.
    pub fn context(self, what: impl Into<String>) -> Self {
        match self {
            StoreError::Engine { code, message, .. } => StoreError::Engine {
                code,
                message,
                context: Some(what.into()),
            },
            other => other,
        }
    }

    /// Native extended result code, when there is one.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            StoreError::Engine { code, .. } if *code >= 0 => Some(*code),
            _ => None,
        }
    }

    /// True for [`LockTimeout`](StoreError::LockTimeout) and [`Locked`](StoreError::Locked).
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. } | StoreError::Locked { .. })
    }
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
