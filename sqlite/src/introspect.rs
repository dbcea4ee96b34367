//! Live schema introspection.
//!
//! Existence predicates and column metadata read from `sqlite_master` and
//! the table-valued forms of the engine's metadata pragmas
//! (`pragma_table_info`, `pragma_index_list`, `pragma_database_list`).
//! Functions taking a `schema` argument accept `None` for the main database
//! or the alias of an attached one.

use rdb_core::ObjectKind;

use crate::connection::Connection;
use crate::error::Result;

/// Quotes an identifier for use in SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn master_table(schema: Option<&str>) -> String {
    match schema {
        Some(alias) => format!("{}.sqlite_master", quote_ident(alias)),
        None => "sqlite_master".to_string(),
    }
}

/// One column of a table as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Name as declared.
    pub name: String,
    /// Declared type, as written in the CREATE statement.
    pub declared_type: String,
    /// Position within the primary key, 0 when not part of it.
    pub pk: i64,
}

/// Columns of one table in declaration order, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypeMap {
    columns: Vec<ColumnInfo>,
}

impl ColumnTypeMap {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declared type of `name`, lowercased.
    pub fn declared_type(&self, name: &str) -> Option<String> {
        self.get(name).map(|c| c.declared_type.to_ascii_lowercase())
    }
}

impl FromIterator<ColumnInfo> for ColumnTypeMap {
    fn from_iter<I: IntoIterator<Item = ColumnInfo>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

fn master_entry_exists(
    conn: &Connection,
    schema: Option<&str>,
    kind: &str,
    name: &str,
) -> Result<bool> {
    let sql = format!(
        "SELECT count(*) FROM {} WHERE type = ?1 AND name = ?2 COLLATE NOCASE",
        master_table(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.bind(1, kind)?.bind(2, name)?;
    Ok(stmt.execute_scalar()? > 0)
}

/// Whether a table exists in the main database.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    master_entry_exists(conn, None, "table", name)
}

/// Whether a table exists in the given attached database.
pub fn table_exists_in(conn: &Connection, schema: &str, name: &str) -> Result<bool> {
    master_entry_exists(conn, Some(schema), "table", name)
}

pub fn view_exists(conn: &Connection, name: &str) -> Result<bool> {
    master_entry_exists(conn, None, "view", name)
}

pub fn index_exists(conn: &Connection, name: &str) -> Result<bool> {
    master_entry_exists(conn, None, "index", name)
}

pub fn trigger_exists(conn: &Connection, name: &str) -> Result<bool> {
    master_entry_exists(conn, None, "trigger", name)
}

/// Whether a temporary table exists on this connection.
pub fn temp_table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT count(*) FROM sqlite_temp_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
    )?;
    stmt.bind(1, name)?;
    Ok(stmt.execute_scalar()? > 0)
}

/// Existence check by kind. Kinds that cannot be introspected always report
/// absent.
pub fn object_exists(conn: &Connection, kind: ObjectKind, name: &str) -> Result<bool> {
    match kind {
        ObjectKind::Table => table_exists(conn, name),
        ObjectKind::View => view_exists(conn, name),
        ObjectKind::Index => index_exists(conn, name),
        ObjectKind::Trigger => trigger_exists(conn, name),
        _ => Ok(false),
    }
}

/// Columns of `table`, or an empty map if the table does not exist.
pub fn column_types(conn: &Connection, schema: Option<&str>, table: &str) -> Result<ColumnTypeMap> {
    let columns = match schema {
        Some(alias) => conn.query_rows(
            "SELECT name, type, pk FROM pragma_table_info(?1, ?2) ORDER BY cid",
            &[&table, &alias],
            column_info,
        )?,
        None => conn.query_rows(
            "SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid",
            &[&table],
            column_info,
        )?,
    };
    Ok(columns.into_iter().collect())
}

fn column_info(row: &crate::RowView<'_, '_>) -> Result<ColumnInfo> {
    Ok(ColumnInfo {
        name: row.get(0)?,
        declared_type: row.get_or(1, String::new())?,
        pk: row.get_or(2, 0)?,
    })
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(column_types(conn, None, table)?.contains(column))
}

/// [`column_exists`] against an attached database.
pub fn column_exists_in(
    conn: &Connection,
    schema: &str,
    table: &str,
    column: &str,
) -> Result<bool> {
    Ok(column_types(conn, Some(schema), table)?.contains(column))
}

/// Whether `table` declares a primary key, including an `INTEGER PRIMARY KEY`
/// row id alias.
pub fn has_primary_key(conn: &Connection, table: &str) -> Result<bool> {
    Ok(column_types(conn, None, table)?
        .columns()
        .iter()
        .any(|c| c.pk > 0))
}

/// Whether `table` has a UNIQUE constraint (not counting the primary key).
pub fn has_unique_key(conn: &Connection, table: &str) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT count(*) FROM pragma_index_list(?1) WHERE \"unique\" = 1 AND origin = 'u'",
    )?;
    stmt.bind(1, table)?;
    Ok(stmt.execute_scalar()? > 0)
}

/// Indexes created with `CREATE INDEX` on `table`.
///
/// Indexes backing PRIMARY KEY or UNIQUE constraints are omitted: they
/// belong to the table definition and cannot be dropped on their own.
pub fn index_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    conn.query_rows(
        "SELECT name FROM pragma_index_list(?1) WHERE origin = 'c' ORDER BY name",
        &[&table],
        |row| row.get(0),
    )
}

/// The CREATE statement text recorded for `table`.
pub fn create_sql(conn: &Connection, schema: Option<&str>, table: &str) -> Result<Option<String>> {
    let sql = format!(
        "SELECT sql FROM {} WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        master_table(schema)
    );
    let found = conn.query_rows(&sql, &[&table], |row| row.get_opt::<String>(0))?;
    Ok(found.into_iter().flatten().next())
}

/// User tables ordered by name, excluding the engine's internal tables.
pub fn table_names(conn: &Connection, schema: Option<&str>) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {} WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
        master_table(schema)
    );
    conn.query_rows(&sql, &[], |row| row.get(0))
}

/// An entry of `pragma_database_list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDatabase {
    pub name: String,
    /// Backing file, empty for in-memory and temporary databases.
    pub file: String,
}

pub fn database_list(conn: &Connection) -> Result<Vec<AttachedDatabase>> {
    conn.query_rows(
        "SELECT name, file FROM pragma_database_list ORDER BY seq",
        &[],
        |row| {
            Ok(AttachedDatabase {
                name: row.get(0)?,
                file: row.get_or(1, String::new())?,
            })
        },
    )
}

/// Whether a database is attached under `alias`.
pub fn is_attached(conn: &Connection, alias: &str) -> Result<bool> {
    Ok(database_list(conn)?
        .iter()
        .any(|db| db.name.eq_ignore_ascii_case(alias)))
}
