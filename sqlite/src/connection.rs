//! Connection handle with the busy/locked retry policy.
//!
//! [`Connection`] wraps a rusqlite connection opened with [`OpenOptions`].
//! Writes issued through [`Connection::execute`] and
//! [`PreparedStatement::execute_update`](crate::PreparedStatement::execute_update)
//! follow a two-level busy policy:
//!
//! 1. The engine's busy handler waits up to
//!    [`BusyPolicy::handler_timeout_ms`](crate::BusyPolicy) per step.
//! 2. If the step still reports busy and the connection is auto-committing
//!    (or the statement itself is a `BEGIN`/`COMMIT`), the statement is
//!    retried after a fixed sleep, up to a bounded number of attempts, then
//!    fails with [`StoreError::LockTimeout`].
//!
//!    Inside an explicit transaction a busy step fails at once with
//!    [`StoreError::Locked`]: waiting there could deadlock against the
//!    caller's own open transaction.
//!
//! # Example
//!
//! ```
//! use rdb_sqlite::Connection;
//!
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute("CREATE TABLE t(a INTEGER)").unwrap();
//! conn.execute("INSERT INTO t VALUES (1), (2), (3)").unwrap();
//! assert_eq!(conn.execute_scalar("SELECT a FROM t").unwrap(), 6);
//! assert_eq!(conn.last_row_id::<i64>(), 3);
//! ```

use std::path::{Path, PathBuf};
use std::thread;

use rusqlite::{ErrorCode, OpenFlags};
use tracing::{debug, warn};

use crate::config::{BusyPolicy, OpenOptions};
use crate::cursor::RowView;
use crate::error::{Result, StoreError};
use crate::statement::PreparedStatement;
use crate::value::BindValue;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// An open database connection.
///
/// Statements borrow the connection, so it cannot be closed or dropped while
/// any [`PreparedStatement`] or cursor created from it is still alive.
#[derive(Debug)]
pub struct Connection {
    inner: rusqlite::Connection,
    path: PathBuf,
    busy: BusyPolicy,
}

impl Connection {
    /// Opens (creating if needed) the database at `path` and applies the
    /// journal, synchronous and locking pragmas from `options`.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let access = if options.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        let flags = access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let inner = rusqlite::Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::from(e).context(path.display().to_string()))?;
        let conn = Self {
            inner,
            path: path.to_path_buf(),
            busy: options.busy.clone(),
        };
        conn.apply_options(options)?;
        debug!(path = %path.display(), journal = ?options.journal_mode, "opened database");
        Ok(conn)
    }

    /// Opens a private in-memory database with default options.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(MEMORY_PATH, &OpenOptions::default())
    }

    fn apply_options(&self, options: &OpenOptions) -> Result<()> {
        // The busy handler must be in place before any statement runs.
        self.inner
            .busy_timeout(options.busy.handler_timeout())
            .map_err(|e| StoreError::from(e).context("busy_timeout"))?;

        if options.read_only {
            return Ok(());
        }
        if let Some(mode) = options.journal_mode.pragma_value() {
            // journal_mode returns a row, so it cannot go through execute_batch.
            let _: String = self
                .inner
                .query_row(&format!("PRAGMA journal_mode = {mode}"), [], |row| row.get(0))
                .map_err(|e| StoreError::from(e).context("PRAGMA journal_mode"))?;
        }
        if options.synchronous_off {
            self.execute("PRAGMA synchronous = OFF")?;
        }
        if options.exclusive {
            self.execute("PRAGMA locking_mode = EXCLUSIVE")?;
        }
        Ok(())
    }

    /// Closes the connection, surfacing any error from the engine.
    pub fn close(self) -> Result<()> {
        let path = self.path.display().to_string();
        self.inner
            .close()
            .map_err(|(_, e)| StoreError::from(e).context(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True for a private in-memory database.
    pub fn is_memory(&self) -> bool {
        is_memory_path(&self.path)
    }

    pub fn busy_policy(&self) -> &BusyPolicy {
        &self.busy
    }

    /// The wrapped rusqlite connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.inner
    }

    /// Executes one or more statements that return no rows.
    ///
    /// A busy retry re-runs the whole text, so multi-statement text should
    /// be idempotent or wrapped in a transaction.
    pub fn execute(&self, sql: &str) -> Result<()> {
        debug!(sql, "execute");
        self.with_retry(sql, || self.inner.execute_batch(sql))
    }

    /// Prepares, binds and executes a single statement, returning the number
    /// of changed rows. Parameters are borrowed for the duration of the call.
    pub fn execute_update(&self, sql: &str, params: &[&dyn BindValue]) -> Result<usize> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute_with(params)
    }

    /// Compiles `sql` into a reusable statement.
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement<'_>> {
        let stmt = self
            .inner
            .prepare(sql)
            .map_err(|e| StoreError::from(e).context(sql))?;
        Ok(PreparedStatement::new(self, stmt, sql))
    }

    /// Runs `sql` and maps every row through `f`.
    pub fn query_rows<T>(
        &self,
        sql: &str,
        params: &[&dyn BindValue],
        mut f: impl FnMut(&RowView<'_, '_>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.prepare(sql)?;
        let mut cursor = stmt.query_with(params)?;
        let mut out = Vec::new();
        while let Some(row) = cursor.next_row()? {
            out.push(f(&row)?);
        }
        Ok(out)
    }

    /// Streams every row of `sql` to `f`.
    pub fn for_each_row(
        &self,
        sql: &str,
        mut f: impl FnMut(&RowView<'_, '_>) -> Result<()>,
    ) -> Result<()> {
        let mut stmt = self.prepare(sql)?;
        let mut cursor = stmt.query()?;
        while let Some(row) = cursor.next_row()? {
            f(&row)?;
        }
        Ok(())
    }

    /// Steps through every row of `sql` and sums its first column.
    pub fn execute_scalar(&self, sql: &str) -> Result<i64> {
        self.prepare(sql)?.execute_scalar()
    }

    /// Most recent automatically assigned row id.
    pub fn last_row_id<T: RowIdValue>(&self) -> T {
        T::from_row_id(self.inner.last_insert_rowid())
    }

    pub fn is_autocommit(&self) -> bool {
        self.inner.is_autocommit()
    }

    pub fn is_in_transaction(&self) -> bool {
        !self.inner.is_autocommit()
    }

    /// Starts an immediate (write-locking) transaction.
    pub fn begin(&self) -> Result<()> {
        self.execute("BEGIN IMMEDIATE TRANSACTION")
    }

    pub fn commit(&self) -> Result<()> {
        self.execute("COMMIT")
    }

    pub fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK")
    }

    /// Rebuilds the database file, reclaiming free pages.
    pub fn vacuum(&self) -> Result<()> {
        self.execute("VACUUM")
    }

    /// Runs `op`, applying the high-level busy policy on busy/locked results.
    pub(crate) fn with_retry<T>(
        &self,
        sql: &str,
        mut op: impl FnMut() -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut attempts = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if is_busy(&err) => {
                    if !self.is_autocommit() && !is_transaction_control(sql) {
                        warn!(sql, "locked inside explicit transaction");
                        return Err(StoreError::Locked {
                            sql: sql.to_string(),
                        });
                    }
                    attempts += 1;
                    if attempts >= self.busy.retry_attempts {
                        warn!(sql, attempts, "giving up on busy database");
                        return Err(StoreError::LockTimeout {
                            sql: sql.to_string(),
                            attempts,
                        });
                    }
                    debug!(sql, attempts, "database busy, retrying");
                    thread::sleep(self.busy.retry_sleep());
                }
                Err(err) => return Err(StoreError::from(err).context(sql)),
            }
        }
    }
}

/// Types [`Connection::last_row_id`] can return.
pub trait RowIdValue {
    fn from_row_id(id: i64) -> Self;
}

impl RowIdValue for i64 {
    fn from_row_id(id: i64) -> Self {
        id
    }
}

impl RowIdValue for String {
    fn from_row_id(id: i64) -> Self {
        id.to_string()
    }
}

pub(crate) fn is_memory_path(path: &Path) -> bool {
    let text = path.as_os_str();
    text.is_empty() || text == MEMORY_PATH
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn is_transaction_control(sql: &str) -> bool {
    let lowered = sql.to_ascii_lowercase();
    lowered.contains("commit") || lowered.contains("begin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_and_execute() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(conn.is_memory());
        conn.execute("CREATE TABLE t(a INTEGER); INSERT INTO t VALUES (5);")
            .unwrap();
        assert_eq!(conn.execute_scalar("SELECT a FROM t").unwrap(), 5);
    }

    #[test]
    fn test_execute_error_carries_sql() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO nowhere VALUES (1)").unwrap_err();
        assert!(matches!(err, StoreError::Engine { .. }));
        assert!(err.to_string().contains("INSERT INTO nowhere"));
    }

    #[test]
    fn test_last_row_id_as_string() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, a)").unwrap();
        conn.execute_update("INSERT INTO t(a) VALUES (?1)", &[&"x"])
            .unwrap();
        conn.execute_update("INSERT INTO t(a) VALUES (?1)", &[&"y"])
            .unwrap();
        assert_eq!(conn.last_row_id::<String>(), "2");
    }

    #[test]
    fn test_transaction_state() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(conn.is_autocommit());
        conn.begin().unwrap();
        assert!(conn.is_in_transaction());
        conn.rollback().unwrap();
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_execute_scalar_sums_all_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t(a); INSERT INTO t VALUES (1), (NULL), (40);")
            .unwrap();
        assert_eq!(conn.execute_scalar("SELECT a FROM t").unwrap(), 41);
        assert_eq!(
            conn.execute_scalar("SELECT a FROM t WHERE a > 100").unwrap(),
            0
        );
    }

    #[test]
    fn test_transaction_control_detection() {
        assert!(is_transaction_control("BEGIN IMMEDIATE TRANSACTION"));
        assert!(is_transaction_control("commit"));
        assert!(!is_transaction_control("INSERT INTO t VALUES (1)"));
    }

    #[test]
    fn test_memory_path_detection() {
        assert!(is_memory_path(Path::new(":memory:")));
        assert!(is_memory_path(Path::new("")));
        assert!(!is_memory_path(Path::new("data.db")));
    }
}
