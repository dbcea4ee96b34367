//! SQLite storage layer with typed marshaling and schema reconciliation.
//!
//! This crate sits on top of an embedded SQLite file and provides:
//!
//! - **Typed marshaling**: [`Connection`], [`PreparedStatement`] and
//!   [`ResultCursor`] bind and read booleans, integers, reals, UTF-8 and
//!   UTF-16 text, blobs, [`Ulid`](rdb_core::Ulid)s, UUIDs and
//!   [`Timestamp`](rdb_core::Timestamp)s, with fixed NULL conventions.
//! - **Busy handling**: writes retry on a busy database while
//!   auto-committing and fail fast inside explicit transactions
//!   (see [`BusyPolicy`]).
//! - **Schema creation**: [`create_all_objects`] applies a
//!   [`Catalog`](rdb_core::Catalog) idempotently.
//! - **Restructuring**: [`Database::check_schema_and_restructure`] rebuilds
//!   tables whose live shape drifted from the catalog, keeping their data.
//! - **Migration**: [`migrate`] moves tables between the two files of a
//!   master/transaction pair.
//! - **Backup** and report **rendering** of result sets.
//!
//! # Architecture
//!
//! - **`connection`**, **`statement`**, **`cursor`**, **`value`**: the
//!   marshaling layer
//! - **`guard`**: the [`AutoCommit`] scope guard
//! - **`introspect`**: existence checks and column metadata
//! - **`schema`**: catalog object creation
//! - **`restructure`**: schema diff and table rebuild
//! - **`migrate`**: attach/detach and cross-database copy
//! - **`database`**: the [`Database`] open/close lifecycle
//! - **`backup`**: online page-stepped copies
//! - **`render`**: tab-delimited, row and JSON output of result sets
//!
//! # Quick start
//!
//! ```
//! use rdb_core::{Catalog, SchemaObject, Timestamp, Ulid};
//! use rdb_sqlite::{Database, MEMORY_PATH, SchemaProvider};
//!
//! struct Members;
//!
//! impl SchemaProvider for Members {
//!     fn catalog(&self) -> Catalog {
//!         Catalog::new().with(SchemaObject::table(
//!             "Members",
//!             "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, name TEXT, timeCreated INTEGER)",
//!         ))
//!     }
//! }
//!
//! let mut db = Database::new(Members, MEMORY_PATH);
//! db.open(true).unwrap();
//! let conn = db.connection().unwrap();
//!
//! let id = Ulid::new();
//! conn.execute_update(
//!     "INSERT INTO Members VALUES (?1, ?2, ?3)",
//!     &[&id, &"Ada", &Timestamp::NULL],
//! )
//! .unwrap();
//!
//! let names = conn
//!     .query_rows("SELECT name FROM Members WHERE id = ?1", &[&id], |row| {
//!         row.get::<String>(0)
//!     })
//!     .unwrap();
//! assert_eq!(names, ["Ada"]);
//! ```

mod backup;
mod config;
mod connection;
mod cursor;
mod database;
mod error;
mod guard;
pub mod introspect;
mod migrate;
pub mod render;
mod restructure;
mod schema;
mod statement;
mod value;

pub use backup::{BackupOptions, BackupOutcome};
pub use config::{BackupSettings, BusyPolicy, JournalMode, OpenOptions, StoreConfig};
pub use connection::{Connection, MEMORY_PATH, RowIdValue};
pub use cursor::{ResultCursor, RowView};
pub use database::{Database, RebuildHook, SchemaProvider};
pub use error::{Result, StoreError};
pub use guard::AutoCommit;
pub use migrate::{MigrationReport, OTHER_ALIAS, attach, detach, migrate};
pub use restructure::{
    ColumnTransform, INTEGER_TO_REAL_DIVISOR, NO_DIVIDE_COLUMNS, OLD_TABLE_SUFFIX, RebuildReason,
    RestructureReport, TablePlan, drop_tables, needs_division, plan_restructure, plan_table,
    restructure_table,
};
pub use schema::{CreateOptions, CreateOutcome, CreateReport, create_all_objects, create_object};
pub use statement::PreparedStatement;
pub use value::{BindValue, ColumnValue, WideText};
