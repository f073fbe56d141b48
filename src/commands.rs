use serde::Deserialize;

use crate::db::Database;
use crate::db_types::{ColumnType, NamedRow, RowId, TableId, TableInfo};
use crate::error::DbError;
use crate::filter::Filter;
use crate::rows::RawValue;

pub type ColumnValues = serde_json::Map<String, RawValue>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTable {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewColumn {
    pub table: TableId,
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewRow {
    pub table: TableId,
    pub columns: ColumnValues,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowQuery {
    pub table: TableId,
    #[serde(default)]
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowUpdate {
    pub table: TableId,
    #[serde(default)]
    pub filter: Filter,
    pub columns: ColumnValues,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowLookup {
    pub table: TableId,
    #[serde(rename = "rowId")]
    pub row_id: RowId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DbCommand {
    CreateTable(NewTable),
    CreateColumn(NewColumn),
    #[serde(rename = "insert")]
    InsertRow(NewRow),
    #[serde(rename = "select")]
    Select(RowQuery),
    #[serde(rename = "update")]
    UpdateRows(RowUpdate),
    #[serde(rename = "delete")]
    DeleteRows(RowQuery),
    GetRow(RowLookup),
    GetTables,
}

/// Result of a bulk update or delete on one matched row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub id: RowId,
    pub result: Result<(), DbError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DbResult {
    Id(u64),
    Row(NamedRow),
    Rows(Vec<NamedRow>),
    Outcomes(Vec<RowOutcome>),
    Tables(Vec<TableInfo>),
}

impl Database {
    pub fn execute(&mut self, cmd: DbCommand) -> Result<DbResult, DbError> {
        match cmd {
            DbCommand::CreateTable(NewTable { name }) => {
                self.create_table(name).map(|id| DbResult::Id(id.into()))
            }
            DbCommand::CreateColumn(col) => {
                let col_type = ColumnType::from_name(&col.col_type)
                    .ok_or_else(|| DbError::UnknownColumnType(col.col_type.clone()))?;
                self.create_column(col.table, &col.name, col_type, col.optional)
                    .map(|id| DbResult::Id(id.into()))
            }
            DbCommand::InsertRow(NewRow { table, columns }) => {
                let values = self.resolve_columns(table, &columns)?;
                self.add_row(table, &values).map(DbResult::Id)
            }
            DbCommand::Select(RowQuery { table, filter }) => {
                self.search(table, &filter).map(DbResult::Rows)
            }
            DbCommand::UpdateRows(RowUpdate {
                table,
                filter,
                columns,
            }) => self
                .update_where(table, &filter, &columns)
                .map(DbResult::Outcomes),
            DbCommand::DeleteRows(RowQuery { table, filter }) => {
                self.delete_where(table, &filter).map(DbResult::Outcomes)
            }
            DbCommand::GetRow(RowLookup { table, row_id }) => {
                self.get_row(table, row_id).map(DbResult::Row)
            }
            DbCommand::GetTables => Ok(DbResult::Tables(self.list_tables())),
        }
    }

    /// Updates every row matching `filter`. Failures are reported per row
    /// and do not stop the remaining rows from being updated.
    pub fn update_where(
        &mut self,
        table: TableId,
        filter: &Filter,
        columns: &ColumnValues,
    ) -> Result<Vec<RowOutcome>, DbError> {
        let values = self.resolve_columns(table, columns)?;
        let ids = self.matching_row_ids(table, filter)?;
        Ok(ids
            .into_iter()
            .map(|id| RowOutcome {
                id,
                result: self.update_row(table, id, &values),
            })
            .collect())
    }

    /// Deletes every row matching `filter`. Reported ids are the ones the
    /// rows had before the delete; survivors are renumbered afterwards.
    pub fn delete_where(
        &mut self,
        table: TableId,
        filter: &Filter,
    ) -> Result<Vec<RowOutcome>, DbError> {
        let ids = self.matching_row_ids(table, filter)?;
        // Highest first, so earlier ids stay valid while we go.
        let mut outcomes: Vec<RowOutcome> = ids
            .into_iter()
            .rev()
            .map(|id| RowOutcome {
                id,
                result: self.delete_row(table, id),
            })
            .collect();
        outcomes.reverse();
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db_types::Value;

    fn filter(field: &str, conds: &[&str]) -> Filter {
        Filter::from([(
            field.to_string(),
            conds.iter().map(|c| c.to_string()).collect(),
        )])
    }

    fn people() -> Database {
        let mut db = Database::with_default_table();
        db.execute(DbCommand::CreateColumn(NewColumn {
            table: 0,
            name: "name".into(),
            col_type: "string".into(),
            optional: false,
        }))
        .unwrap();
        db.execute(DbCommand::CreateColumn(NewColumn {
            table: 0,
            name: "age".into(),
            col_type: "number".into(),
            optional: false,
        }))
        .unwrap();
        for (name, age) in [("none", 0), ("null", 100), ("noname", 42)] {
            let columns = json!({"name": name, "age": age});
            db.execute(DbCommand::InsertRow(NewRow {
                table: 0,
                columns: columns.as_object().unwrap().clone(),
            }))
            .unwrap();
        }
        db
    }

    #[test]
    fn commands_decode_from_tagged_json() {
        let cmd: DbCommand = serde_json::from_value(json!({
            "op": "insert",
            "table": 0,
            "columns": {"name": "ada"}
        }))
        .unwrap();
        assert!(matches!(cmd, DbCommand::InsertRow(NewRow { table: 0, .. })));

        let cmd: DbCommand = serde_json::from_value(json!({
            "op": "select",
            "table": 1,
            "filter": {"name": ["=ada"]}
        }))
        .unwrap();
        assert_eq!(
            cmd,
            DbCommand::Select(RowQuery {
                table: 1,
                filter: filter("name", &["=ada"]),
            })
        );

        let cmd: DbCommand =
            serde_json::from_value(json!({"op": "getRow", "table": 0, "rowId": 4})).unwrap();
        assert_eq!(cmd, DbCommand::GetRow(RowLookup { table: 0, row_id: 4 }));

        let cmd: DbCommand = serde_json::from_value(json!({"op": "getTables"})).unwrap();
        assert_eq!(cmd, DbCommand::GetTables);
    }

    #[test]
    fn unknown_column_type_is_rejected() {
        let mut db = Database::with_default_table();
        let err = db
            .execute(DbCommand::CreateColumn(NewColumn {
                table: 0,
                name: "x".into(),
                col_type: "int".into(),
                optional: false,
            }))
            .unwrap_err();
        assert_eq!(err, DbError::UnknownColumnType("int".into()));
    }

    #[test]
    fn insert_with_unknown_column_name_adds_nothing() {
        let mut db = people();
        let err = db
            .execute(DbCommand::InsertRow(NewRow {
                table: 0,
                columns: json!({"name": "x", "height": 3}).as_object().unwrap().clone(),
            }))
            .unwrap_err();
        assert_eq!(err, DbError::ColumnNotFound("height".into()));
        assert_eq!(db.all_rows(0).unwrap().len(), 3);
    }

    #[test]
    fn update_where_reports_each_matched_row() {
        let mut db = people();
        let outcomes = db
            .update_where(
                0,
                &filter("name", &["<no"]),
                json!({"age": 7}).as_object().unwrap(),
            )
            .unwrap();

        let ids: Vec<RowId> = outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(db.get_row(0, 2).unwrap().columns["age"], Value::Number(7.0));
        assert_eq!(db.get_row(0, 1).unwrap().columns["age"], Value::Number(100.0));
    }

    #[test]
    fn update_where_reports_type_mismatch_per_row() {
        let mut db = people();
        let outcomes = db
            .update_where(
                0,
                &filter("age", &[">40"]),
                json!({"age": "old"}).as_object().unwrap(),
            )
            .unwrap();

        let expected = DbError::TypeMismatch {
            column: "age".into(),
            expected: ColumnType::Number,
        };
        assert_eq!(
            outcomes,
            vec![
                RowOutcome {
                    id: 1,
                    result: Err(expected.clone())
                },
                RowOutcome {
                    id: 2,
                    result: Err(expected)
                },
            ]
        );
        assert_eq!(db.get_row(0, 1).unwrap().columns["age"], Value::Number(100.0));
        assert_eq!(db.get_row(0, 2).unwrap().columns["age"], Value::Number(42.0));
    }

    #[test]
    fn delete_where_removes_matches_and_renumbers() {
        let mut db = people();
        let outcomes = db
            .delete_where(0, &filter("name", &["<no"]))
            .unwrap();
        let ids: Vec<RowId> = outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 2]);

        let rows = db.search(0, &Filter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 0);
        assert_eq!(rows[0].columns["name"], Value::Text("null".into()));
    }

    #[test]
    fn structural_filter_error_aborts_bulk_operations() {
        let mut db = people();
        let err = db
            .delete_where(0, &filter("age", &[".4"]))
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidOperator { .. }));
        assert_eq!(db.all_rows(0).unwrap().len(), 3);
    }
}
