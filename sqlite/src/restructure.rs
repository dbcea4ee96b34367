//! Schema diff and table reconstruction.
//!
//! The live database is compared table by table against a reference built
//! from the declared catalog. A table is planned for rebuild when its column
//! count differs, when it has a column the declaration no longer has, or
//! when a column's declared type changed. Rebuilding is a
//! rename-recreate-copy sequence:
//!
//! 1. drop the table's own indexes (the recreated table brings its own),
//! 2. rename `t` to `t_old`,
//! 3. create `t` from its catalog entry,
//! 4. copy the columns both versions share with
//!    `INSERT INTO t(...) SELECT ... FROM t_old`,
//! 5. leave `t_old` for the caller to drop with [`drop_tables`].
//!
//! A column whose type changes from integer to real is divided by
//! [`INTEGER_TO_REAL_DIVISOR`] on the way across, unless its name contains
//! one of the quantity-like names in [`NO_DIVIDE_COLUMNS`].

use std::collections::BTreeMap;

use rdb_core::{RelatedNames, SchemaObject};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::introspect::{ColumnTypeMap, column_types, index_names, quote_ident, table_names};
use crate::schema::create_object;

/// Divisor applied to integer columns that become real.
pub const INTEGER_TO_REAL_DIVISOR: f64 = 10_000.0;

/// Column name fragments exempt from the integer-to-real division.
pub const NO_DIVIDE_COLUMNS: [&str; 6] = [
    "qoh",
    "reorderqty",
    "reorderlevel",
    "qty",
    "quantity",
    "packsize",
];

/// Suffix given to a table while it is being rebuilt.
pub const OLD_TABLE_SUFFIX: &str = "_old";

/// Whether an integer column named `column` is divided when it becomes real.
///
/// # Examples
///
/// ```
/// use rdb_sqlite::needs_division;
///
/// assert!(needs_division("price"));
/// assert!(!needs_division("QtyOnHand"));
/// assert!(!needs_division("packSize"));
/// ```
pub fn needs_division(column: &str) -> bool {
    let lowered = column.to_ascii_lowercase();
    !NO_DIVIDE_COLUMNS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

fn is_integer_type(declared: &str) -> bool {
    matches!(declared.trim().to_ascii_lowercase().as_str(), "integer" | "int")
}

fn is_real_type(declared: &str) -> bool {
    matches!(
        declared.trim().to_ascii_lowercase().as_str(),
        "real" | "double" | "float"
    )
}

/// How one column's values are carried into the rebuilt table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnTransform {
    Identity,
    /// Divide numeric values by the given factor.
    Divide(f64),
}

impl ColumnTransform {
    /// Transform for a column whose declared type goes from `from` to `to`.
    pub fn for_type_change(column: &str, from: &str, to: &str) -> Self {
        if is_integer_type(from) && is_real_type(to) && needs_division(column) {
            ColumnTransform::Divide(INTEGER_TO_REAL_DIVISOR)
        } else {
            ColumnTransform::Identity
        }
    }

    /// SELECT-list expression reading `column` with this transform applied.
    pub fn select_expr(&self, column: &str) -> String {
        match self {
            ColumnTransform::Identity => quote_ident(column),
            ColumnTransform::Divide(factor) => {
                format!("CAST({} AS REAL) / {factor:?}", quote_ident(column))
            }
        }
    }
}

/// Why a table was planned for rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    ColumnCount { live: usize, declared: usize },
    /// A live column the declaration no longer has.
    Removed(String),
    TypeChanged {
        column: String,
        from: String,
        to: String,
    },
}

/// Rebuild plan for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    /// Table name as found in the live database.
    pub table: String,
    pub reason: RebuildReason,
    /// Non-identity transforms keyed by lowercased column name.
    pub transforms: BTreeMap<String, ColumnTransform>,
}

impl TablePlan {
    pub fn transform(&self, column: &str) -> ColumnTransform {
        self.transforms
            .get(&column.to_ascii_lowercase())
            .copied()
            .unwrap_or(ColumnTransform::Identity)
    }
}

/// Outcome of a full reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestructureReport {
    pub rebuilt: Vec<String>,
    /// Tables whose rebuild failed, with the error text. Their `_old` copy
    /// is left in place.
    pub failed: Vec<(String, String)>,
    /// Old copies dropped after the rebuilds.
    pub dropped: Vec<String>,
}

impl RestructureReport {
    pub fn is_unchanged(&self) -> bool {
        self.rebuilt.is_empty() && self.failed.is_empty()
    }
}

/// Compares one table's live columns with its declared columns.
///
/// Returns `None` when the table already matches.
pub fn plan_table(table: &str, live: &ColumnTypeMap, declared: &ColumnTypeMap) -> Option<TablePlan> {
    let mut reason = (live.len() != declared.len()).then(|| RebuildReason::ColumnCount {
        live: live.len(),
        declared: declared.len(),
    });
    let mut transforms = BTreeMap::new();

    for column in live.columns() {
        let Some(target) = declared.get(&column.name) else {
            reason.get_or_insert_with(|| RebuildReason::Removed(column.name.clone()));
            continue;
        };
        if column.declared_type.eq_ignore_ascii_case(&target.declared_type) {
            continue;
        }
        reason.get_or_insert_with(|| RebuildReason::TypeChanged {
            column: column.name.clone(),
            from: column.declared_type.clone(),
            to: target.declared_type.clone(),
        });
        let transform =
            ColumnTransform::for_type_change(&column.name, &column.declared_type, &target.declared_type);
        if transform != ColumnTransform::Identity {
            transforms.insert(column.name.to_ascii_lowercase(), transform);
        }
    }

    reason.map(|reason| TablePlan {
        table: table.to_string(),
        reason,
        transforms,
    })
}

/// Plans rebuilds for every live table that also exists in `reference`.
///
/// Tables the reference does not declare are left alone.
pub fn plan_restructure(live: &Connection, reference: &Connection) -> Result<Vec<TablePlan>> {
    let mut plans = Vec::new();
    for table in table_names(live, None)? {
        let declared = column_types(reference, None, &table)?;
        if declared.is_empty() {
            continue;
        }
        let current = column_types(live, None, &table)?;
        if let Some(plan) = plan_table(&table, &current, &declared) {
            debug!(table = %plan.table, reason = ?plan.reason, "table needs rebuild");
            plans.push(plan);
        }
    }
    Ok(plans)
}

/// Rebuilds one table according to `plan`, creating it from `object`.
///
/// Returns the name of the renamed original, which the caller drops once
/// every rebuild is finished. On error the renamed original may be left in
/// place for manual recovery.
pub fn restructure_table(
    conn: &Connection,
    object: &SchemaObject,
    plan: &TablePlan,
    related: &RelatedNames,
) -> Result<String> {
    let table = plan.table.as_str();
    let old = format!("{table}{OLD_TABLE_SUFFIX}");

    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&old)))?;
    rename_table(conn, table, &old)?;
    // Indexes travel with the rename; free their names for the new table.
    for index in index_names(conn, &old)? {
        conn.execute(&format!("DROP INDEX IF EXISTS {}", quote_ident(&index)))?;
    }

    create_object(conn, object, false, related)?;

    let new_columns = column_types(conn, None, &object.name)?;
    let old_columns = column_types(conn, None, &old)?;
    let shared: Vec<&str> = new_columns
        .columns()
        .iter()
        .filter(|c| old_columns.contains(&c.name))
        .map(|c| c.name.as_str())
        .collect();

    if !shared.is_empty() {
        let targets = shared
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sources = shared
            .iter()
            .map(|c| plan.transform(c).select_expr(c))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(&format!(
            "INSERT INTO {} ({targets}) SELECT {sources} FROM {}",
            quote_ident(&object.name),
            quote_ident(&old)
        ))?;
    }

    info!(table, columns = shared.len(), "table rebuilt");
    Ok(old)
}

/// Renames without rewriting references held by views, triggers and
/// foreign keys, which must keep pointing at the rebuilt table.
fn rename_table(conn: &Connection, from: &str, to: &str) -> Result<()> {
    conn.execute("PRAGMA legacy_alter_table = ON")?;
    let renamed = conn.execute(&format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(from),
        quote_ident(to)
    ));
    let restored = conn.execute("PRAGMA legacy_alter_table = OFF");
    renamed.and(restored)
}

/// Drops each named table, logging failures, then compacts the database if
/// anything was dropped. Returns the tables actually dropped.
pub fn drop_tables(conn: &Connection, tables: &[String]) -> Result<Vec<String>> {
    let mut dropped = Vec::new();
    for table in tables {
        match conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table))) {
            Ok(()) => dropped.push(table.clone()),
            Err(err) => warn!(table = %table, error = %err, "failed to drop table"),
        }
    }
    if !dropped.is_empty() {
        conn.vacuum()?;
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::{ColumnInfo, index_exists, table_exists};

    fn map(columns: &[(&str, &str)]) -> ColumnTypeMap {
        columns
            .iter()
            .map(|(name, ty)| ColumnInfo {
                name: name.to_string(),
                declared_type: ty.to_string(),
                pk: 0,
            })
            .collect()
    }

    #[test]
    fn test_needs_division_allow_list() {
        for name in ["qoh", "ReorderQty", "reorderLevel", "qty", "Quantity", "packSize", "minQty"] {
            assert!(!needs_division(name), "{name}");
        }
        assert!(needs_division("price"));
        assert!(needs_division("amount"));
    }

    #[test]
    fn test_plan_matching_table_is_none() {
        let live = map(&[("id", "INTEGER"), ("name", "TEXT")]);
        let declared = map(&[("ID", "integer"), ("Name", "text")]);
        assert!(plan_table("t", &live, &declared).is_none());
    }

    #[test]
    fn test_plan_type_change_records_division() {
        let live = map(&[("id", "INTEGER"), ("price", "INTEGER"), ("qty", "INTEGER")]);
        let declared = map(&[("id", "INTEGER"), ("price", "REAL"), ("qty", "REAL")]);
        let plan = plan_table("t", &live, &declared).unwrap();
        assert!(matches!(plan.reason, RebuildReason::TypeChanged { ref column, .. } if column == "price"));
        assert_eq!(plan.transform("PRICE"), ColumnTransform::Divide(10_000.0));
        assert_eq!(plan.transform("qty"), ColumnTransform::Identity);
        assert_eq!(plan.transform("id"), ColumnTransform::Identity);
    }

    #[test]
    fn test_plan_added_and_removed_columns() {
        let live = map(&[("id", "INTEGER")]);
        let declared = map(&[("id", "INTEGER"), ("note", "TEXT")]);
        let plan = plan_table("t", &live, &declared).unwrap();
        assert_eq!(
            plan.reason,
            RebuildReason::ColumnCount {
                live: 1,
                declared: 2
            }
        );

        let live = map(&[("id", "INTEGER"), ("legacy", "TEXT")]);
        let declared = map(&[("id", "INTEGER"), ("note", "TEXT")]);
        let plan = plan_table("t", &live, &declared).unwrap();
        assert_eq!(plan.reason, RebuildReason::Removed("legacy".into()));
    }

    #[test]
    fn test_transform_expressions() {
        assert_eq!(ColumnTransform::Identity.select_expr("a"), "\"a\"");
        assert_eq!(
            ColumnTransform::Divide(10_000.0).select_expr("price"),
            "CAST(\"price\" AS REAL) / 10000.0"
        );
    }

    #[test]
    fn test_restructure_table_converts_and_keeps_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE items(id INTEGER, price INTEGER, legacy TEXT);
             CREATE INDEX idx_items_price ON items(price);
             INSERT INTO items VALUES (1, 15000, 'x'), (2, 20000, 'y');",
        )
        .unwrap();
        let object = SchemaObject::table("items", "CREATE TABLE <TABLENAME>(id INTEGER, price REAL)")
            .with_statement("CREATE INDEX idx_items_price ON <TABLENAME>(price)");
        let live = column_types(&conn, None, "items").unwrap();
        let declared = map(&[("id", "INTEGER"), ("price", "REAL")]);
        let plan = plan_table("items", &live, &declared).unwrap();

        let old = restructure_table(&conn, &object, &plan, &RelatedNames::default()).unwrap();
        assert_eq!(old, "items_old");
        assert!(table_exists(&conn, "items_old").unwrap());
        assert!(index_exists(&conn, "idx_items_price").unwrap());

        let prices = conn
            .query_rows("SELECT price FROM items ORDER BY id", &[], |row| row.get::<f64>(0))
            .unwrap();
        assert_eq!(prices, vec![1.5, 2.0]);

        assert_eq!(drop_tables(&conn, &[old]).unwrap(), ["items_old"]);
        assert!(!table_exists(&conn, "items_old").unwrap());
    }

    #[test]
    fn test_failed_rebuild_leaves_table_and_indexes_alone() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE items(id INTEGER, price INTEGER);
             CREATE INDEX idx_items_price ON items(price);
             CREATE VIEW items_old AS SELECT 1;
             INSERT INTO items VALUES (1, 15000);",
        )
        .unwrap();
        let object = SchemaObject::table("items", "CREATE TABLE <TABLENAME>(id INTEGER, price REAL)")
            .with_statement("CREATE INDEX idx_items_price ON <TABLENAME>(price)");
        let live = column_types(&conn, None, "items").unwrap();
        let declared = map(&[("id", "INTEGER"), ("price", "REAL")]);
        let plan = plan_table("items", &live, &declared).unwrap();

        // A view holding the backup name makes DROP TABLE fail.
        assert!(restructure_table(&conn, &object, &plan, &RelatedNames::default()).is_err());
        assert!(index_exists(&conn, "idx_items_price").unwrap());
        assert_eq!(index_names(&conn, "items").unwrap(), ["idx_items_price"]);
        assert_eq!(conn.execute_scalar("SELECT price FROM items").unwrap(), 15000);
    }

    #[test]
    fn test_rename_keeps_view_pointing_at_rebuilt_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE t(a INTEGER);
             CREATE VIEW v_t AS SELECT a FROM t;
             INSERT INTO t VALUES (7);",
        )
        .unwrap();
        let object = SchemaObject::table("t", "CREATE TABLE <TABLENAME>(a INTEGER, b TEXT)");
        let live = column_types(&conn, None, "t").unwrap();
        let declared = map(&[("a", "INTEGER"), ("b", "TEXT")]);
        let plan = plan_table("t", &live, &declared).unwrap();
        let old = restructure_table(&conn, &object, &plan, &RelatedNames::default()).unwrap();
        drop_tables(&conn, &[old]).unwrap();
        assert_eq!(conn.execute_scalar("SELECT a FROM v_t").unwrap(), 7);
    }

    #[test]
    fn test_drop_tables_logs_and_continues() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE a_old(x)").unwrap();
        let dropped = drop_tables(&conn, &["a_old".to_string(), "never_there".to_string()]).unwrap();
        assert_eq!(dropped.len(), 2);
        assert!(drop_tables(&conn, &[]).unwrap().is_empty());
    }
}
