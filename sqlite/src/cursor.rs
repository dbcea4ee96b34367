//! Forward-only result cursors.
//!
//! A [`ResultCursor`] borrows the statement that produced it and yields rows
//! once, in order. Dropping the cursor resets the statement.

use rusqlite::types::{Type, ValueRef};

use crate::error::{Result, StoreError};
use crate::value::ColumnValue;

/// Single-pass sequence of result rows.
pub struct ResultCursor<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    columns: Vec<String>,
}

impl<'stmt> ResultCursor<'stmt> {
    pub(crate) fn new(rows: rusqlite::Rows<'stmt>, columns: Vec<String>) -> Self {
        Self { rows, columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        self.columns
            .get(index)
            .map(String::as_str)
            .ok_or(StoreError::IndexOutOfBounds {
                index,
                count: self.columns.len(),
            })
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        column_position(&self.columns, name)
    }

    /// Advances to the next row. Returns `None` once the rows are exhausted.
    pub fn next_row(&mut self) -> Result<Option<RowView<'_, 'stmt>>> {
        let columns = &self.columns;
        let row = self.rows.next()?;
        Ok(row.map(|row| RowView { row, columns }))
    }
}

fn column_position(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.eq_ignore_ascii_case(name))
}

/// The current row of a [`ResultCursor`].
///
/// NULL handling: [`get`](Self::get) returns the type's canonical unset
/// value (empty identifier, nil UUID, null timestamp) and fails for other
/// types; [`get_or`](Self::get_or) substitutes the caller's default for
/// types without one.
pub struct RowView<'a, 'stmt> {
    row: &'a rusqlite::Row<'stmt>,
    columns: &'a [String],
}

impl RowView<'_, '_> {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        self.columns
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.columns.len() {
            Ok(())
        } else {
            Err(StoreError::IndexOutOfBounds {
                index,
                count: self.columns.len(),
            })
        }
    }

    /// Raw engine value of column `index`.
    pub fn value_ref(&self, index: usize) -> Result<ValueRef<'_>> {
        self.check(index)?;
        Ok(self.row.get_ref(index)?)
    }

    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(matches!(self.value_ref(index)?, ValueRef::Null))
    }

    /// Storage class of column `index` in this row.
    pub fn column_type(&self, index: usize) -> Result<Type> {
        Ok(self.value_ref(index)?.data_type())
    }

    fn convert<T: ColumnValue>(&self, index: usize, value: ValueRef<'_>) -> Result<T> {
        T::from_sql_value(value).map_err(|message| StoreError::TypeMismatch {
            column: self.columns[index].clone(),
            message,
        })
    }

    pub fn get<T: ColumnValue>(&self, index: usize) -> Result<T> {
        match self.value_ref(index)? {
            ValueRef::Null => T::null_value().ok_or_else(|| StoreError::TypeMismatch {
                column: self.columns[index].clone(),
                message: "unexpected NULL".to_string(),
            }),
            value => self.convert(index, value),
        }
    }

    pub fn get_or<T: ColumnValue>(&self, index: usize, default: T) -> Result<T> {
        match self.value_ref(index)? {
            ValueRef::Null => Ok(T::null_value().unwrap_or(default)),
            value => self.convert(index, value),
        }
    }

    /// Like [`get`](Self::get) but maps NULL to `None` for every type.
    pub fn get_opt<T: ColumnValue>(&self, index: usize) -> Result<Option<T>> {
        match self.value_ref(index)? {
            ValueRef::Null => Ok(None),
            value => self.convert(index, value).map(Some),
        }
    }

    /// [`get`](Self::get) by case-insensitive column name.
    pub fn get_by_name<T: ColumnValue>(&self, name: &str) -> Result<T> {
        let index = column_position(self.columns, name)
            .ok_or_else(|| StoreError::UnknownColumn(name.to_string()))?;
        self.get(index)
    }
}
