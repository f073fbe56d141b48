use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub type TableId = u8;
pub type ColumnId = u32;
pub type RowId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "string")]
    Text,
    #[serde(rename = "bool")]
    Bool,
}

impl ColumnType {
    /// The name clients use for this type when creating a column.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Number => "number",
            ColumnType::Text => "string",
            ColumnType::Bool => "bool",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(ColumnType::Number),
            "string" => Some(ColumnType::Text),
            "bool" => Some(ColumnType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Number(_) => ColumnType::Number,
            Value::Text(_) => ColumnType::Text,
            Value::Bool(_) => ColumnType::Bool,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub values: BTreeMap<ColumnId, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id as usize)
    }
}

/// A table's rows together with the schema describing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDefinition {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

impl TableDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            schema: TableSchema {
                name: name.into(),
                columns: Vec::new(),
            },
            rows: Vec::new(),
        }
    }

    /// Rewrites a row to the name-keyed form handed to clients.
    pub fn named_row(&self, row: &Row) -> NamedRow {
        let columns = row
            .values
            .iter()
            .filter_map(|(id, value)| {
                self.schema
                    .column(*id)
                    .map(|col| (col.name.clone(), value.clone()))
            })
            .collect();
        NamedRow { id: row.id, columns }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRow {
    pub id: RowId,
    pub columns: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
}
