use std::collections::BTreeMap;

use crate::db::Database;
use crate::db_types::{Column, ColumnId, ColumnType, NamedRow, Row, RowId, TableId, Value};
use crate::error::DbError;

/// Raw values as clients send them, before they are checked against a column.
pub type RawValue = serde_json::Value;

/// Converts a client value to the column's declared type.
///
/// Numbers are always stored as `f64`, whether the client sent an integer or a
/// float. Nothing else is converted: a string is never parsed into a number.
pub fn coerce(column: &Column, raw: &RawValue) -> Result<Value, DbError> {
    let value = match (column.col_type, raw) {
        (ColumnType::Number, RawValue::Number(n)) => n.as_f64().map(Value::Number),
        (ColumnType::Text, RawValue::String(s)) => Some(Value::Text(s.clone())),
        (ColumnType::Bool, RawValue::Bool(b)) => Some(Value::Bool(*b)),
        _ => None,
    };
    value.ok_or_else(|| DbError::TypeMismatch {
        column: column.name.clone(),
        expected: column.col_type,
    })
}

impl Database {
    /// Maps a name-keyed payload to column ids. Any unknown name fails the
    /// whole payload.
    pub fn resolve_columns(
        &self,
        table: TableId,
        named: &serde_json::Map<String, RawValue>,
    ) -> Result<BTreeMap<ColumnId, RawValue>, DbError> {
        named
            .iter()
            .map(|(name, raw)| Ok((self.find_column_by_name(table, name)?, raw.clone())))
            .collect()
    }

    /// Appends a row and returns its id, which is the row count before the
    /// insert. Values that do not coerce to their column's type are dropped.
    pub fn add_row(
        &mut self,
        table: TableId,
        values: &BTreeMap<ColumnId, RawValue>,
    ) -> Result<RowId, DbError> {
        let table_def = self.table_mut(table)?;

        let mut row = Row {
            id: table_def.rows.len() as RowId,
            values: BTreeMap::new(),
        };
        for (&column_id, raw) in values {
            let column = table_def
                .schema
                .column(column_id)
                .ok_or_else(|| DbError::ColumnNotFound(format!("#{column_id}")))?;
            match coerce(column, raw) {
                Ok(value) => {
                    row.values.insert(column_id, value);
                }
                Err(err) => tracing::warn!(table, error = %err, "dropping value"),
            }
        }

        let id = row.id;
        table_def.rows.push(row);
        Ok(id)
    }

    /// Writes the supplied values into an existing row, coercing each one the
    /// same way [`Database::add_row`] does. Columns the row did not have yet
    /// are added. Unlike an insert, a value that fails coercion rejects the
    /// whole update and the row is left as it was.
    pub fn update_row(
        &mut self,
        table: TableId,
        row_id: RowId,
        values: &BTreeMap<ColumnId, RawValue>,
    ) -> Result<(), DbError> {
        let table_def = self.table_mut(table)?;
        let row = table_def
            .rows
            .get_mut(row_id as usize)
            .ok_or(DbError::RowNotFound(row_id))?;

        let mut coerced = Vec::with_capacity(values.len());
        for (&column_id, raw) in values {
            let Some(column) = table_def.schema.column(column_id) else {
                return Err(DbError::ColumnNotFound(format!("#{column_id}")));
            };
            coerced.push((column_id, coerce(column, raw)?));
        }
        row.values.extend(coerced);
        Ok(())
    }

    /// Removes a row. Row ids are positions, so every later row moves down by
    /// one; ids are not stable across deletes.
    pub fn delete_row(&mut self, table: TableId, row_id: RowId) -> Result<(), DbError> {
        let rows = &mut self.table_mut(table)?.rows;
        if row_id as usize >= rows.len() {
            return Err(DbError::RowNotFound(row_id));
        }

        rows.remove(row_id as usize);
        for (pos, row) in rows.iter_mut().enumerate().skip(row_id as usize) {
            row.id = pos as RowId;
        }
        Ok(())
    }

    pub fn all_rows(&self, table: TableId) -> Result<&[Row], DbError> {
        Ok(&self.table(table)?.rows)
    }

    pub fn get_row(&self, table: TableId, row_id: RowId) -> Result<NamedRow, DbError> {
        let table_def = self.table(table)?;
        let row = table_def
            .rows
            .get(row_id as usize)
            .ok_or(DbError::RowNotFound(row_id))?;
        Ok(table_def.named_row(row))
    }
}
