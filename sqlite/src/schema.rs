//! Idempotent creation of catalog objects.
//!
//! [`create_object`] checks whether an object already exists (by kind),
//! optionally drops it, and otherwise runs its DDL templates with the
//! `<TABLENAME>`, `<MASTER>` and `<SIBLING>` placeholders substituted.
//! [`create_all_objects`] applies a whole [`Catalog`] in order.
//!
//! Any failure is reported as [`StoreError::SchemaInconsistent`]: a database
//! whose declared objects cannot be created is not usable.
//!
//! # Example
//!
//! ```
//! use rdb_core::{Catalog, RelatedNames, SchemaObject};
//! use rdb_sqlite::{Connection, CreateOptions, create_all_objects};
//!
//! let conn = Connection::open_in_memory().unwrap();
//! let catalog = Catalog::new()
//!     .with(SchemaObject::table("keys", "CREATE TABLE <TABLENAME>(key TEXT)"))
//!     .with(SchemaObject::command("seed", "INSERT INTO keys VALUES ('first')"));
//!
//! let first = CreateOptions { run_one_shot: true, ..CreateOptions::default() };
//! create_all_objects(&conn, &catalog, &RelatedNames::default(), first).unwrap();
//! // Second pass: objects exist and commands are skipped.
//! create_all_objects(&conn, &catalog, &RelatedNames::default(), CreateOptions::default()).unwrap();
//! assert_eq!(conn.execute_scalar("SELECT count(*) FROM keys").unwrap(), 1);
//! ```

use rdb_core::{Catalog, RelatedNames, SchemaObject};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Result, StoreError};
use crate::introspect::{object_exists, quote_ident};

/// What happened to one object during creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Already present and left alone.
    Existing,
    /// Statements were executed.
    Created,
    /// Dropped, then created again.
    Recreated,
    /// One-shot command skipped because this is not the first creation.
    Skipped,
}

/// Flags for [`create_all_objects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateOptions {
    /// Drop and recreate every object that already exists.
    pub drop_existing: bool,
    /// Execute `Command` entries. Only set on first-ever creation.
    pub run_one_shot: bool,
}

/// Counts per outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateReport {
    pub created: usize,
    pub recreated: usize,
    pub existing: usize,
    pub skipped: usize,
}

impl CreateReport {
    fn record(&mut self, outcome: CreateOutcome) {
        match outcome {
            CreateOutcome::Existing => self.existing += 1,
            CreateOutcome::Created => self.created += 1,
            CreateOutcome::Recreated => self.recreated += 1,
            CreateOutcome::Skipped => self.skipped += 1,
        }
    }
}

fn inconsistent(object: &SchemaObject, err: StoreError) -> StoreError {
    StoreError::SchemaInconsistent {
        object: object.name.clone(),
        message: err.to_string(),
    }
}

/// Creates one object unless it already exists.
///
/// With `drop_if_exists`, an existing object is dropped first and then
/// created from its templates.
pub fn create_object(
    conn: &Connection,
    object: &SchemaObject,
    drop_if_exists: bool,
    related: &RelatedNames,
) -> Result<CreateOutcome> {
    let exists =
        object_exists(conn, object.kind, &object.name).map_err(|e| inconsistent(object, e))?;

    let outcome = match (exists, drop_if_exists) {
        (true, false) => return Ok(CreateOutcome::Existing),
        (true, true) => {
            let drop = format!("DROP {} {}", object.kind.keyword(), quote_ident(&object.name));
            conn.execute(&drop).map_err(|e| inconsistent(object, e))?;
            CreateOutcome::Recreated
        }
        (false, _) => CreateOutcome::Created,
    };

    for sql in object.render(related) {
        conn.execute(&sql).map_err(|e| inconsistent(object, e))?;
    }
    debug!(object = %object.name, kind = ?object.kind, ?outcome, "schema object ready");
    Ok(outcome)
}

/// Applies every entry of `catalog` in order.
///
/// `Command` entries run only when `options.run_one_shot` is set; all other
/// kinds follow `options.drop_existing`.
pub fn create_all_objects(
    conn: &Connection,
    catalog: &Catalog,
    related: &RelatedNames,
    options: CreateOptions,
) -> Result<CreateReport> {
    let mut report = CreateReport::default();
    for object in catalog {
        if object.kind.is_one_shot() && !options.run_one_shot {
            report.record(CreateOutcome::Skipped);
            continue;
        }
        let outcome = create_object(conn, object, options.drop_existing, related)?;
        report.record(outcome);
    }
    info!(
        created = report.created,
        recreated = report.recreated,
        existing = report.existing,
        "catalog applied"
    );
    Ok(report)
}
