//! Prepared statements.
//!
//! A [`PreparedStatement`] borrows its [`Connection`], so the native handle
//! stays valid for as long as any statement exists. Bindings come in two
//! forms:
//!
//! - [`bind`](PreparedStatement::bind) / [`bind_named`](PreparedStatement::bind_named)
//!   hand the value to the engine immediately. The engine keeps its own
//!   copy, the binding survives across executions, and the caller's value
//!   may be dropped right away.
//! - [`execute_with`](PreparedStatement::execute_with) /
//!   [`query_with`](PreparedStatement::query_with) take borrowed parameters
//!   for one call. This saves the caller building owned values; it is not
//!   zero-copy. The engine copies text and blobs at bind time in both forms,
//!   so these bindings also outlive the borrowed values.
//!
//! The statement is reset automatically after every execution and when a
//! cursor is dropped, so it can be rebound and re-executed.
//!
//! # Example
//!
//! ```
//! use rdb_sqlite::Connection;
//!
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute("CREATE TABLE kv(key TEXT, value INTEGER)").unwrap();
//!
//! let mut insert = conn.prepare("INSERT INTO kv VALUES (:key, :value)").unwrap();
//! for (i, key) in ["a", "b", "c"].iter().enumerate() {
//!     insert.bind_named(":key", *key).unwrap();
//!     insert.bind_named(":value", i as i64).unwrap();
//!     insert.execute_update().unwrap();
//! }
//! drop(insert);
//! assert_eq!(conn.execute_scalar("SELECT value FROM kv").unwrap(), 3);
//! ```

use rusqlite::types::ValueRef;
use tracing::trace;

use crate::connection::Connection;
use crate::cursor::ResultCursor;
use crate::error::{Result, StoreError};
use crate::value::{BindValue, Bound};

/// 2^63, the first real past the `i64` range.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// A compiled statement tied to a [`Connection`].
pub struct PreparedStatement<'conn> {
    conn: &'conn Connection,
    stmt: rusqlite::Statement<'conn>,
    sql: String,
}

impl<'conn> PreparedStatement<'conn> {
    pub(crate) fn new(conn: &'conn Connection, stmt: rusqlite::Statement<'conn>, sql: &str) -> Self {
        Self {
            conn,
            stmt,
            sql: sql.to_string(),
        }
    }

    /// The SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The SQL text with current bindings expanded, for diagnostics.
    pub fn expanded_sql(&self) -> Option<String> {
        self.stmt.expanded_sql()
    }

    pub fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    /// Name of the 1-based parameter `index`, if it is named.
    pub fn parameter_name(&self, index: usize) -> Option<&str> {
        self.stmt.parameter_name(index)
    }

    /// 1-based index of the named parameter (including its `:`, `@` or `$` prefix).
    pub fn parameter_index(&self, name: &str) -> Result<usize> {
        match self.stmt.parameter_index(name) {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Err(StoreError::UnknownParameter(name.to_string())),
            Err(e) => Err(StoreError::from(e).context(&self.sql)),
        }
    }

    pub fn column_count(&self) -> usize {
        self.stmt.column_count()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Binds `value` to the 1-based parameter `index`.
    pub fn bind<T: BindValue>(&mut self, index: usize, value: T) -> Result<&mut Self> {
        self.bind_dyn(index, &value)?;
        Ok(self)
    }

    /// Binds `value` to a named parameter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownParameter`] if the statement has no
    /// parameter called `name`.
    pub fn bind_named<T: BindValue>(&mut self, name: &str, value: T) -> Result<&mut Self> {
        let index = self.parameter_index(name)?;
        self.bind_dyn(index, &value)?;
        Ok(self)
    }

    pub fn bind_null(&mut self, index: usize) -> Result<&mut Self> {
        self.bind_dyn(index, &rusqlite::types::Null)?;
        Ok(self)
    }

    fn bind_dyn(&mut self, index: usize, value: &dyn BindValue) -> Result<()> {
        let count = self.stmt.parameter_count();
        if index == 0 || index > count {
            return Err(StoreError::IndexOutOfBounds { index, count });
        }
        self.stmt
            .raw_bind_parameter(index, Bound(value))
            .map_err(|e| StoreError::from(e).context(&self.sql))
    }

    fn bind_all(&mut self, params: &[&dyn BindValue]) -> Result<()> {
        let count = self.stmt.parameter_count();
        if params.len() != count {
            return Err(StoreError::IndexOutOfBounds {
                index: params.len(),
                count,
            });
        }
        for (offset, value) in params.iter().enumerate() {
            self.bind_dyn(offset + 1, *value)?;
        }
        Ok(())
    }

    /// Executes with the current bindings and returns the number of changed
    /// rows, applying the connection's busy policy.
    pub fn execute_update(&mut self) -> Result<usize> {
        trace!(sql = %self.sql, "execute statement");
        let conn = self.conn;
        let stmt = &mut self.stmt;
        conn.with_retry(&self.sql, || stmt.raw_execute())
    }

    /// Binds `params` positionally and executes. The engine copies each value,
    /// so the bindings stay in place for later executions.
    pub fn execute_with(&mut self, params: &[&dyn BindValue]) -> Result<usize> {
        self.bind_all(params)?;
        self.execute_update()
    }

    /// Starts a query with the current bindings.
    pub fn query(&mut self) -> Result<ResultCursor<'_>> {
        trace!(sql = %self.sql, "query statement");
        let columns = self.column_names();
        Ok(ResultCursor::new(self.stmt.raw_query(), columns))
    }

    /// Binds `params` positionally and starts a query.
    pub fn query_with(&mut self, params: &[&dyn BindValue]) -> Result<ResultCursor<'_>> {
        self.bind_all(params)?;
        self.query()
    }

    /// Steps through every row and sums the first column. NULLs count as zero
    /// and reals are truncated toward zero.
    ///
    /// # Errors
    ///
    /// [`StoreError::TypeMismatch`] for a text or blob value, a real outside
    /// the 64-bit range, or a sum that overflows.
    pub fn execute_scalar(&mut self) -> Result<i64> {
        let mut cursor = self.query()?;
        let mut total = 0i64;
        while let Some(row) = cursor.next_row()? {
            let mismatch = |message: &str| StoreError::TypeMismatch {
                column: row.column_names()[0].clone(),
                message: message.to_string(),
            };
            let value = match row.value_ref(0)? {
                ValueRef::Null => 0,
                ValueRef::Integer(i) => i,
                ValueRef::Real(f) if (-I64_BOUND..I64_BOUND).contains(&f.trunc()) => f.trunc() as i64,
                ValueRef::Real(_) => {
                    return Err(mismatch("real value does not fit in a 64-bit integer"));
                }
                _ => return Err(mismatch("scalar column is not numeric")),
            };
            total = total
                .checked_add(value)
                .ok_or_else(|| mismatch("sum overflows a 64-bit integer"))?;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for PreparedStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE kv(key TEXT, value INTEGER)").unwrap();
        conn
    }

    #[test]
    fn test_bind_named_unknown_parameter() {
        let conn = kv();
        let mut stmt = conn.prepare("INSERT INTO kv VALUES (:key, :value)").unwrap();
        let err = stmt.bind_named(":missing", 1i64).unwrap_err();
        assert!(matches!(err, StoreError::UnknownParameter(name) if name == ":missing"));
    }

    #[test]
    fn test_bind_index_out_of_bounds() {
        let conn = kv();
        let mut stmt = conn.prepare("INSERT INTO kv VALUES (?1, ?2)").unwrap();
        assert!(matches!(
            stmt.bind(3, 1i64),
            Err(StoreError::IndexOutOfBounds { index: 3, count: 2 })
        ));
        assert!(stmt.bind(0, 1i64).is_err());
    }

    #[test]
    fn test_bindings_survive_reexecution() {
        let conn = kv();
        let mut stmt = conn.prepare("INSERT INTO kv VALUES (?1, ?2)").unwrap();
        {
            let key = String::from("shared");
            stmt.bind(1, key.as_str()).unwrap();
        }
        stmt.bind(2, 1i64).unwrap();
        stmt.execute_update().unwrap();
        stmt.bind(2, 2i64).unwrap();
        stmt.execute_update().unwrap();
        drop(stmt);
        assert_eq!(
            conn.execute_scalar("SELECT count(*) FROM kv WHERE key = 'shared'")
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_borrowed_bindings_are_copied() {
        let conn = kv();
        let mut stmt = conn.prepare("INSERT INTO kv VALUES (?1, ?2)").unwrap();
        {
            let key = String::from("temp");
            stmt.execute_with(&[&key.as_str(), &1i64]).unwrap();
        }
        stmt.execute_update().unwrap();
        drop(stmt);
        assert_eq!(
            conn.execute_scalar("SELECT count(*) FROM kv WHERE key = 'temp'")
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_execute_with_checks_parameter_count() {
        let conn = kv();
        let mut stmt = conn.prepare("INSERT INTO kv VALUES (?1, ?2)").unwrap();
        assert!(stmt.execute_with(&[&"only-one"]).is_err());
        assert_eq!(stmt.execute_with(&[&"a", &1i64]).unwrap(), 1);
    }

    #[test]
    fn test_parameter_metadata() {
        let conn = kv();
        let stmt = conn.prepare("SELECT * FROM kv WHERE key = :key").unwrap();
        assert_eq!(stmt.parameter_count(), 1);
        assert_eq!(stmt.parameter_name(1), Some(":key"));
        assert_eq!(stmt.parameter_index(":key").unwrap(), 1);
        assert_eq!(stmt.column_names(), vec!["key", "value"]);
    }

    #[test]
    fn test_query_then_requery() {
        let conn = kv();
        conn.execute("INSERT INTO kv VALUES ('a', 1), ('b', 2)").unwrap();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1").unwrap();
        for (key, expected) in [("a", 1i64), ("b", 2)] {
            let mut cursor = stmt.query_with(&[&key]).unwrap();
            let row = cursor.next_row().unwrap().unwrap();
            assert_eq!(row.get::<i64>(0).unwrap(), expected);
        }
    }

    #[test]
    fn test_scalar_sum_overflow_is_an_error() {
        let conn = kv();
        conn.execute("INSERT INTO kv VALUES ('max', 9223372036854775807), ('one', 1)")
            .unwrap();
        let mut stmt = conn.prepare("SELECT value FROM kv").unwrap();
        assert!(matches!(
            stmt.execute_scalar(),
            Err(StoreError::TypeMismatch { message, .. }) if message.contains("overflows")
        ));
    }

    #[test]
    fn test_scalar_truncates_reals_and_rejects_huge_ones() {
        let conn = kv();
        conn.execute("INSERT INTO kv VALUES ('a', 2.9), ('b', -1.5), ('c', NULL)")
            .unwrap();
        assert_eq!(conn.execute_scalar("SELECT value FROM kv").unwrap(), 1);

        let mut stmt = conn.prepare("SELECT 1e19").unwrap();
        assert!(matches!(
            stmt.execute_scalar(),
            Err(StoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_scalar_rejects_text() {
        let conn = kv();
        conn.execute("INSERT INTO kv VALUES ('a', 1)").unwrap();
        let mut stmt = conn.prepare("SELECT key FROM kv").unwrap();
        assert!(matches!(
            stmt.execute_scalar(),
            Err(StoreError::TypeMismatch { .. })
        ));
    }
}
