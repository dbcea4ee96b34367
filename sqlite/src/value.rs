//! Typed value marshaling.
//!
//! [`BindValue`] turns a Rust value into one of the engine's storage classes
//! (NULL, INTEGER, REAL, TEXT, BLOB) and [`ColumnValue`] reads it back. The
//! mapping is fixed:
//!
//! | Rust type              | Storage class | NULL reads back as        |
//! |------------------------|---------------|---------------------------|
//! | `bool`                 | INTEGER 0/1   | caller default            |
//! | `i32`, `i64`, `u32`    | INTEGER       | caller default            |
//! | `f64`                  | REAL          | caller default            |
//! | `String`, `&str`       | TEXT          | caller default            |
//! | [`WideText`]           | TEXT          | caller default            |
//! | `Vec<u8>`, `&[u8]`     | BLOB          | caller default            |
//! | [`Ulid`]               | BLOB(16)      | [`Ulid::EMPTY`]           |
//! | [`Uuid`]               | BLOB(16)      | [`Uuid::nil`]             |
//! | [`Timestamp`]          | INTEGER ms    | [`Timestamp::NULL`]       |
//! | `DateTime<Utc>`        | INTEGER ms    | 0000-01-01T00:00:00Z      |
//!
//! [`Timestamp::NULL`] (and the equivalent `DateTime`) is never stored as an
//! integer: binding it stores SQL NULL.

use chrono::{DateTime, Utc};
use rdb_core::{BYTE_LEN, Timestamp, Ulid};
use rusqlite::ToSql;
use rusqlite::types::{Null, ToSqlOutput, Value, ValueRef};
use uuid::Uuid;

/// A value that can be bound to a statement parameter.
pub trait BindValue {
    /// Converts to an engine value. Text and blobs may borrow from `self`
    /// until the engine copies them at bind time.
    fn to_sql_output(&self) -> ToSqlOutput<'_>;
}

/// A value that can be read from a result column.
///
/// `from_sql_value` is only called for non-NULL values. Types with a
/// canonical "unset" representation override [`null_value`](Self::null_value),
/// which then wins over any caller-supplied default.
pub trait ColumnValue: Sized {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String>;

    fn null_value() -> Option<Self> {
        None
    }
}

/// Adapts a [`BindValue`] for rusqlite's binding calls.
pub(crate) struct Bound<'a>(pub(crate) &'a dyn BindValue);

impl ToSql for Bound<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.0.to_sql_output())
    }
}

/// UTF-16 text, recoded to UTF-8 at the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WideText(pub Vec<u16>);

impl WideText {
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

impl From<&str> for WideText {
    fn from(s: &str) -> Self {
        WideText(s.encode_utf16().collect())
    }
}

impl<T: BindValue + ?Sized> BindValue for &T {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        (**self).to_sql_output()
    }
}

impl<T: BindValue> BindValue for Option<T> {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        match self {
            Some(value) => value.to_sql_output(),
            None => ToSqlOutput::Owned(Value::Null),
        }
    }
}

impl BindValue for Null {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Null)
    }
}

impl BindValue for bool {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Integer(i64::from(*self)))
    }
}

impl BindValue for i32 {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Integer(i64::from(*self)))
    }
}

impl BindValue for u32 {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Integer(i64::from(*self)))
    }
}

impl BindValue for i64 {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Integer(*self))
    }
}

impl BindValue for f64 {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Real(*self))
    }
}

impl BindValue for str {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Borrowed(ValueRef::Text(self.as_bytes()))
    }
}

impl BindValue for String {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        self.as_str().to_sql_output()
    }
}

impl BindValue for WideText {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Owned(Value::Text(self.to_string_lossy()))
    }
}

impl BindValue for [u8] {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Borrowed(ValueRef::Blob(self))
    }
}

impl BindValue for Vec<u8> {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        self.as_slice().to_sql_output()
    }
}

impl BindValue for Ulid {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Borrowed(ValueRef::Blob(self.as_bytes()))
    }
}

impl BindValue for Uuid {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Borrowed(ValueRef::Blob(self.as_bytes()))
    }
}

impl BindValue for Timestamp {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        if self.is_null() {
            ToSqlOutput::Owned(Value::Null)
        } else {
            ToSqlOutput::Owned(Value::Integer(self.millis()))
        }
    }
}

impl BindValue for DateTime<Utc> {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        let ts = Timestamp::from(*self);
        if ts.is_null() {
            ToSqlOutput::Owned(Value::Null)
        } else {
            ToSqlOutput::Owned(Value::Integer(ts.millis()))
        }
    }
}

impl BindValue for Value {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Borrowed(ValueRef::from(self))
    }
}

impl BindValue for ValueRef<'_> {
    fn to_sql_output(&self) -> ToSqlOutput<'_> {
        ToSqlOutput::Borrowed(*self)
    }
}

fn type_name(value: ValueRef<'_>) -> &'static str {
    match value {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    }
}

fn mismatch(value: ValueRef<'_>, wanted: &str) -> String {
    format!("cannot read {} as {wanted}", type_name(value))
}

fn text_of(value: ValueRef<'_>) -> Option<&str> {
    match value {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

impl ColumnValue for i64 {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        match value {
            ValueRef::Integer(i) => Ok(i),
            ValueRef::Real(f) if f.fract() == 0.0 => Ok(f as i64),
            ValueRef::Text(_) => text_of(value)
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| mismatch(value, "integer")),
            _ => Err(mismatch(value, "integer")),
        }
    }
}

impl ColumnValue for i32 {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{wide} does not fit in a 32-bit integer"))
    }
}

impl ColumnValue for u32 {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        u32::try_from(wide).map_err(|_| format!("{wide} does not fit in an unsigned 32-bit integer"))
    }
}

impl ColumnValue for bool {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        i64::from_sql_value(value).map(|i| i != 0)
    }
}

impl ColumnValue for f64 {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        match value {
            ValueRef::Real(f) => Ok(f),
            ValueRef::Integer(i) => Ok(i as f64),
            ValueRef::Text(_) => text_of(value)
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| mismatch(value, "real")),
            _ => Err(mismatch(value, "real")),
        }
    }
}

impl ColumnValue for String {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        match value {
            ValueRef::Text(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Integer(i) => Ok(i.to_string()),
            ValueRef::Real(f) => Ok(f.to_string()),
            _ => Err(mismatch(value, "text")),
        }
    }
}

impl ColumnValue for WideText {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        String::from_sql_value(value).map(|s| WideText::from(s.as_str()))
    }
}

impl ColumnValue for Vec<u8> {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        match value {
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Ok(bytes.to_vec()),
            _ => Err(mismatch(value, "blob")),
        }
    }
}

impl ColumnValue for Ulid {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        match value {
            ValueRef::Blob(bytes) => Ulid::from_slice(bytes).map_err(|e| e.to_string()),
            // Older rows may hold the text form.
            ValueRef::Text(_) => text_of(value)
                .ok_or_else(|| mismatch(value, "identifier"))?
                .parse()
                .map_err(|e: rdb_core::IdError| e.to_string()),
            _ => Err(mismatch(value, "identifier")),
        }
    }

    fn null_value() -> Option<Self> {
        Some(Ulid::EMPTY)
    }
}

impl ColumnValue for Uuid {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        match value {
            ValueRef::Blob(bytes) if bytes.len() == BYTE_LEN => {
                Uuid::from_slice(bytes).map_err(|e| e.to_string())
            }
            ValueRef::Text(_) => text_of(value)
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| mismatch(value, "uuid")),
            _ => Err(mismatch(value, "uuid")),
        }
    }

    fn null_value() -> Option<Self> {
        Some(Uuid::nil())
    }
}

impl ColumnValue for Timestamp {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        i64::from_sql_value(value).map(Timestamp::from_millis)
    }

    fn null_value() -> Option<Self> {
        Some(Timestamp::NULL)
    }
}

impl ColumnValue for DateTime<Utc> {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        let ms = i64::from_sql_value(value)?;
        DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("{ms} ms is out of range"))
    }

    fn null_value() -> Option<Self> {
        Timestamp::NULL.to_datetime()
    }
}

impl ColumnValue for Value {
    fn from_sql_value(value: ValueRef<'_>) -> std::result::Result<Self, String> {
        Ok(Value::from(value))
    }

    fn null_value() -> Option<Self> {
        Some(Value::Null)
    }
}
