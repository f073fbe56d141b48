use thiserror::Error;

use crate::db_types::{ColumnType, RowId, TableId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    #[error("table {0} not found")]
    TableNotFound(TableId),
    #[error("column `{0}` not found")]
    ColumnNotFound(String),
    #[error("row {0} not found")]
    RowNotFound(RowId),
    #[error("value for column `{column}` is not a {expected}")]
    TypeMismatch { column: String, expected: ColumnType },
    #[error("operator `{operator}` is not allowed on {column_type} fields")]
    InvalidOperator {
        operator: char,
        column_type: ColumnType,
    },
    #[error("malformed condition `{condition}`: {reason}")]
    MalformedCondition { condition: String, reason: String },
    #[error("column `{0}` already exists")]
    DuplicateColumn(String),
    #[error("unknown column type `{0}`")]
    UnknownColumnType(String),
    #[error("table limit of {0} reached")]
    TooManyTables(usize),
    #[error("database is unavailable")]
    Unavailable,
}

impl DbError {
    /// Stable name used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::TableNotFound(_) => "TableNotFound",
            DbError::ColumnNotFound(_) => "ColumnNotFound",
            DbError::RowNotFound(_) => "RowNotFound",
            DbError::TypeMismatch { .. } => "TypeMismatch",
            DbError::InvalidOperator { .. } => "InvalidOperator",
            DbError::MalformedCondition { .. } => "MalformedCondition",
            DbError::DuplicateColumn(_) => "DuplicateColumn",
            DbError::UnknownColumnType(_) => "UnknownColumnType",
            DbError::TooManyTables(_) => "TooManyTables",
            DbError::Unavailable => "Unavailable",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DbError::TableNotFound(_) | DbError::ColumnNotFound(_) | DbError::RowNotFound(_)
        )
    }
}
