use crate::db::Database;
use crate::db_types::{Column, ColumnId, ColumnType, TableDefinition, TableId, TableInfo};
use crate::error::DbError;
use crate::filter::ID_FIELD;

/// Tables are addressed by a `TableId`, which bounds how many can exist.
pub const MAX_TABLES: usize = TableId::MAX as usize + 1;

impl Database {
    pub fn create_table(&mut self, name: impl Into<String>) -> Result<TableId, DbError> {
        if self.tables.len() >= MAX_TABLES {
            return Err(DbError::TooManyTables(MAX_TABLES));
        }
        let id = self.tables.len() as TableId;
        self.tables.push(TableDefinition::named(name));
        Ok(id)
    }

    /// Appends a column to the table's schema. Column ids are dense and never
    /// reused since columns cannot be dropped. `id` is taken by the row id in
    /// filters and counts as an existing column.
    pub fn create_column(
        &mut self,
        table: TableId,
        name: &str,
        col_type: ColumnType,
        optional: bool,
    ) -> Result<ColumnId, DbError> {
        let schema = &mut self.table_mut(table)?.schema;
        if name == ID_FIELD || schema.columns.iter().any(|c| c.name == name) {
            return Err(DbError::DuplicateColumn(name.to_string()));
        }

        let id = schema.columns.len() as ColumnId;
        schema.columns.push(Column {
            id,
            name: name.to_string(),
            col_type,
            optional,
        });
        tracing::debug!(table, column = id, name, %col_type, "column created");
        Ok(id)
    }

    pub fn find_column_by_name(&self, table: TableId, name: &str) -> Result<ColumnId, DbError> {
        self.table(table)?
            .schema
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string()))
    }

    pub fn list_tables(&self) -> Vec<TableInfo> {
        self.tables
            .iter()
            .enumerate()
            .map(|(id, table)| TableInfo {
                id: id as TableId,
                name: table.schema.name.clone(),
                columns: table.schema.columns.clone(),
                row_count: table.rows.len(),
            })
            .collect()
    }
}
