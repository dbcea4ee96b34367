//! Auto-commit scope guard.
//!
//! [`AutoCommit`] makes a sequence of statements atomic. If the connection
//! is auto-committing when the guard is created, the guard begins a
//! transaction and owns it. The transaction commits only when the guard was
//! marked successful; any other exit (early return, `?`, panic) rolls it back.
//! When the connection is already inside a transaction the guard does
//! nothing and leaves the outer transaction in charge.
//!
//! # Example
//!
//! ```
//! use rdb_sqlite::{AutoCommit, Connection};
//!
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute("CREATE TABLE t(a)").unwrap();
//!
//! {
//!     let _guard = AutoCommit::begin(&conn).unwrap();
//!     conn.execute("INSERT INTO t VALUES (1)").unwrap();
//!     // dropped without set_ok: rolled back
//! }
//! assert_eq!(conn.execute_scalar("SELECT count(*) FROM t").unwrap(), 0);
//!
//! let mut guard = AutoCommit::begin(&conn).unwrap();
//! conn.execute("INSERT INTO t VALUES (1)").unwrap();
//! guard.set_ok();
//! guard.finish().unwrap();
//! assert_eq!(conn.execute_scalar("SELECT count(*) FROM t").unwrap(), 1);
//! ```

use tracing::warn;

use crate::connection::Connection;
use crate::error::Result;

/// Commits on success, rolls back otherwise.
#[must_use = "the transaction rolls back as soon as the guard is dropped"]
pub struct AutoCommit<'c> {
    conn: &'c Connection,
    owns_transaction: bool,
    ok: bool,
    finished: bool,
}

impl<'c> AutoCommit<'c> {
    /// Begins a transaction if the connection is auto-committing.
    pub fn begin(conn: &'c Connection) -> Result<Self> {
        let owns_transaction = conn.is_autocommit();
        if owns_transaction {
            conn.begin()?;
        }
        Ok(Self {
            conn,
            owns_transaction,
            ok: false,
            finished: false,
        })
    }

    /// Marks the scope as successful so it commits on exit.
    pub fn set_ok(&mut self) {
        self.ok = true;
    }

    /// True when this guard started the transaction.
    pub fn owns_transaction(&self) -> bool {
        self.owns_transaction
    }

    /// Ends the scope now and reports commit or rollback errors instead of
    /// logging them.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        if !self.owns_transaction {
            return Ok(());
        }
        if self.ok {
            self.conn.commit()
        } else {
            self.conn.rollback()
        }
    }
}

impl Drop for AutoCommit<'_> {
    fn drop(&mut self) {
        if self.finished || !self.owns_transaction || self.conn.is_autocommit() {
            return;
        }
        let outcome = if self.ok {
            self.conn.commit()
        } else {
            self.conn.rollback()
        };
        if let Err(err) = outcome {
            warn!(error = %err, committed = self.ok, "failed to end auto-commit scope");
        }
    }
}
