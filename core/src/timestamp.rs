//! Millisecond timestamps with a reserved "no timestamp" value.
//!
//! Storage layers persist [`Timestamp::NULL`] as SQL `NULL` rather than as
//! its integer value, and map `NULL` back to it on read.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds from the Unix epoch to 0000-01-01T00:00:00Z.
pub const NULL_TIMESTAMP_MS: i64 = -62_167_219_200_000;

/// Milliseconds since the Unix epoch, UTC.
///
/// # Examples
///
/// ```
/// use rdb_core::Timestamp;
///
/// assert!(Timestamp::default().is_null());
/// let t = Timestamp::from_millis(1_700_000_000_000);
/// assert_eq!(t.to_datetime().unwrap().timestamp_millis(), t.millis());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The canonical "no timestamp" value (year 0000-01-01 UTC).
    pub const NULL: Timestamp = Timestamp(NULL_TIMESTAMP_MS);

    pub const fn from_millis(ms: i64) -> Self {
        Timestamp(ms)
    }

    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    pub fn is_null(self) -> bool {
        self.0 == NULL_TIMESTAMP_MS
    }

    /// Converts to a chrono date-time. Returns `None` when out of chrono's range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::NULL
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp(value.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("null");
        }
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "{}ms", self.0),
        }
    }
}
