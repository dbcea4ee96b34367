//! Cross-database table migration.
//!
//! [`migrate`] moves whole tables from a source database into a destination
//! database. Each table is copied inside its own [`AutoCommit`] scope:
//!
//! - a table the source does not have is skipped,
//! - an existing destination table is emptied, a missing one is created from
//!   the source's own `CREATE TABLE` text,
//! - the columns both sides share are copied, with the same integer-to-real
//!   division rule the restructuring engine applies.
//!
//! A failing table aborts the call with [`StoreError::MigrationFailed`];
//! tables migrated before it stay migrated. Successfully migrated tables are
//! returned in [`MigrationReport::pending_drop`] so the caller can remove
//! them from the source once it is done (see
//! [`drop_tables`](crate::drop_tables)).
//!
//! [`attach`] and [`detach`] make a second file visible to one connection
//! under an alias, by default [`OTHER_ALIAS`].

use std::path::Path;

use rusqlite::types::ValueRef;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Result, StoreError};
use crate::guard::AutoCommit;
use crate::introspect::{column_types, create_sql, is_attached, quote_ident, table_exists, table_names};
use crate::restructure::ColumnTransform;
use crate::value::BindValue;

/// Alias under which the other database of a master/transaction pair is attached.
pub const OTHER_ALIAS: &str = "master";

/// Attaches the database file at `path` as `alias`.
///
/// Returns `false` when something is already attached under that alias.
pub fn attach(conn: &Connection, path: impl AsRef<Path>, alias: &str) -> Result<bool> {
    if is_attached(conn, alias)? {
        return Ok(false);
    }
    let file = path.as_ref().to_string_lossy().into_owned();
    conn.execute_update(&format!("ATTACH DATABASE ?1 AS {}", quote_ident(alias)), &[&file])?;
    debug!(alias, file = %file, "attached database");
    Ok(true)
}

/// Detaches `alias`. Returns `false` when nothing was attached under it.
pub fn detach(conn: &Connection, alias: &str) -> Result<bool> {
    if !is_attached(conn, alias)? {
        return Ok(false);
    }
    conn.execute(&format!("DETACH DATABASE {}", quote_ident(alias)))?;
    debug!(alias, "detached database");
    Ok(true)
}

/// Outcome of a successful [`migrate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Migrated tables, to be dropped from the source by the caller.
    pub pending_drop: Vec<String>,
    /// Requested tables the source does not have.
    pub skipped: Vec<String>,
    pub rows_copied: usize,
}

impl MigrationReport {
    pub fn migrated(&self) -> &[String] {
        &self.pending_drop
    }
}

/// Migrates `tables` into `dest`. `None` or an empty list means every table
/// of `source`.
pub fn migrate(dest: &Connection, source: &Connection, tables: Option<&[&str]>) -> Result<MigrationReport> {
    let names: Vec<String> = match tables {
        Some(list) if !list.is_empty() => list.iter().map(|t| t.to_string()).collect(),
        _ => table_names(source, None)?,
    };

    let mut report = MigrationReport::default();
    for table in names {
        match migrate_table(dest, source, &table) {
            Ok(Some(rows)) => {
                info!(table = %table, rows, "table migrated");
                report.rows_copied += rows;
                report.pending_drop.push(table);
            }
            Ok(None) => {
                debug!(table = %table, "not in source, skipped");
                report.skipped.push(table);
            }
            Err(err) => {
                warn!(table = %table, error = %err, "migration failed");
                return Err(StoreError::MigrationFailed {
                    table,
                    migrated: report.pending_drop,
                    source: Box::new(err),
                });
            }
        }
    }
    Ok(report)
}

/// Copies one table. `None` means the source has no such table.
fn migrate_table(dest: &Connection, source: &Connection, table: &str) -> Result<Option<usize>> {
    let Some(create) = create_sql(source, None, table)? else {
        return Ok(None);
    };

    let mut guard = AutoCommit::begin(dest)?;
    if table_exists(dest, table)? {
        dest.execute(&format!("DELETE FROM {}", quote_ident(table)))?;
    } else {
        dest.execute(&create)?;
    }

    let source_columns = column_types(source, None, table)?;
    let dest_columns = column_types(dest, None, table)?;
    let mut targets = Vec::new();
    let mut sources = Vec::new();
    for column in dest_columns.columns() {
        let Some(from) = source_columns.get(&column.name) else {
            continue;
        };
        let transform =
            ColumnTransform::for_type_change(&column.name, &from.declared_type, &column.declared_type);
        targets.push(quote_ident(&column.name));
        sources.push(transform.select_expr(&column.name));
    }

    let mut copied = 0;
    if !targets.is_empty() {
        let select = format!("SELECT {} FROM {}", sources.join(", "), quote_ident(table));
        let placeholders = (1..=targets.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote_ident(table),
            targets.join(", ")
        );

        let mut reader = source.prepare(&select)?;
        let mut writer = dest.prepare(&insert)?;
        let mut cursor = reader.query()?;
        while let Some(row) = cursor.next_row()? {
            let values = (0..targets.len())
                .map(|i| row.value_ref(i))
                .collect::<Result<Vec<ValueRef<'_>>>>()?;
            let params: Vec<&dyn BindValue> = values.iter().map(|v| v as &dyn BindValue).collect();
            copied += writer.execute_with(&params)?;
        }
    }

    guard.set_ok();
    guard.finish()?;
    Ok(Some(copied))
}
