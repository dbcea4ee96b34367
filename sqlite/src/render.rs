//! Text renderings of a result cursor for reports.
//!
//! Column names may carry formatting hints after an `@`
//! (`price@decimal@f2`); only the part before the first `@` is shown.
//! Blobs of exactly 16 bytes are shown as identifier text, other blobs as hex.

use rdb_core::{BYTE_LEN, Ulid};
use rusqlite::types::ValueRef;
use serde_json::{Map, Value as Json};

use crate::cursor::{ResultCursor, RowView};
use crate::error::Result;

/// Field separator used when real tabs are not requested.
pub const UNIT_SEPARATOR: char = '\u{1f}';
/// Record separator used when real tabs are not requested.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Options for [`tab_delimited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Start with a line holding the number of data rows.
    pub include_row_count: bool,
    pub include_header: bool,
    /// Tab and CRLF with trimmed fields, instead of the ASCII unit and record
    /// separators with fields as stored.
    pub use_actual_tab: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_row_count: false,
            include_header: true,
            use_actual_tab: true,
        }
    }
}

/// Display name of a column: everything before the first `@`.
pub fn display_name(column: &str) -> &str {
    column.split('@').next().unwrap_or(column)
}

/// Text form of one value; NULL renders as an empty string.
pub fn value_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) if b.len() == BYTE_LEN => match Ulid::from_slice(b) {
            Ok(id) => id.to_string(),
            Err(_) => hex::encode(b),
        },
        ValueRef::Blob(b) => hex::encode(b),
    }
}

fn row_texts(row: &RowView<'_, '_>) -> Result<Vec<String>> {
    (0..row.column_count())
        .map(|i| row.value_ref(i).map(value_text))
        .collect()
}

fn header(cursor: &ResultCursor<'_>) -> Vec<String> {
    cursor
        .column_names()
        .iter()
        .map(|c| display_name(c).to_string())
        .collect()
}

/// Renders every remaining row as delimited text.
pub fn tab_delimited(cursor: &mut ResultCursor<'_>, options: RenderOptions) -> Result<String> {
    let (field, record) = if options.use_actual_tab {
        ("\t".to_string(), "\r\n".to_string())
    } else {
        (UNIT_SEPARATOR.to_string(), RECORD_SEPARATOR.to_string())
    };

    let mut lines = Vec::new();
    if options.include_header {
        lines.push(header(cursor).join(&field));
    }
    let mut count = 0usize;
    while let Some(row) = cursor.next_row()? {
        let mut fields = row_texts(&row)?;
        if options.use_actual_tab {
            for text in &mut fields {
                *text = text.trim().to_string();
            }
        }
        lines.push(fields.join(&field));
        count += 1;
    }
    if options.include_row_count {
        lines.insert(0, count.to_string());
    }
    Ok(lines.join(&record))
}

/// Every remaining row as strings, optionally preceded by the header.
pub fn rows(cursor: &mut ResultCursor<'_>, include_header: bool) -> Result<Vec<Vec<String>>> {
    let mut out = Vec::new();
    if include_header {
        out.push(header(cursor));
    }
    while let Some(row) = cursor.next_row()? {
        out.push(row_texts(&row)?);
    }
    Ok(out)
}

/// Every remaining row as a JSON object keyed by display name.
///
/// NULL columns are left out of their object.
pub fn json(cursor: &mut ResultCursor<'_>) -> Result<Json> {
    let names = header(cursor);
    let mut out = Vec::new();
    while let Some(row) = cursor.next_row()? {
        let mut object = Map::new();
        for (i, name) in names.iter().enumerate() {
            let value = match row.value_ref(i)? {
                ValueRef::Null => continue,
                ValueRef::Integer(v) => Json::from(v),
                ValueRef::Real(v) => Json::from(v),
                other => Json::String(value_text(other)),
            };
            object.insert(name.clone(), value);
        }
        out.push(Json::Object(object));
    }
    Ok(Json::Array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    const SQL: &str = "SELECT 1 AS \"id@int\", ' x ' AS name, NULL AS gone
                       UNION ALL SELECT 2, 'y', x'00ff'";

    #[test]
    fn test_tab_delimited_with_tabs() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare(SQL).unwrap();
        let mut cursor = stmt.query().unwrap();
        let text = tab_delimited(
            &mut cursor,
            RenderOptions {
                include_row_count: true,
                ..RenderOptions::default()
            },
        )
        .unwrap();
        assert_eq!(text, "2\r\nid\tname\tgone\r\n1\tx\t\r\n2\ty\t00ff");
    }

    #[test]
    fn test_tab_delimited_with_separators() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare(SQL).unwrap();
        let mut cursor = stmt.query().unwrap();
        let text = tab_delimited(
            &mut cursor,
            RenderOptions {
                include_row_count: false,
                include_header: false,
                use_actual_tab: false,
            },
        )
        .unwrap();
        assert_eq!(text, "1\u{1f} x \u{1f}\u{1e}2\u{1f}y\u{1f}00ff");
    }

    #[test]
    fn test_rows_and_json() {
        let conn = Connection::open_in_memory().unwrap();
        let id = Ulid::new();
        let mut stmt = conn.prepare("SELECT ?1 AS id, 2.5 AS ratio, NULL AS gone").unwrap();
        stmt.bind(1, id).unwrap();
        let table = rows(&mut stmt.query().unwrap(), true).unwrap();
        assert_eq!(table[0], ["id", "ratio", "gone"]);
        assert_eq!(table[1], [id.to_string(), "2.5".to_string(), String::new()]);

        let value = json(&mut stmt.query().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{ "id": id.to_string(), "ratio": 2.5 }])
        );
    }
}
