pub mod codec;
pub mod commands;
pub mod config;
pub mod db;
pub mod db_types;
pub mod error;
pub mod filter;
pub mod rows;
pub mod schema;
pub mod snapshot;
pub mod web;

pub use commands::{DbCommand, DbResult};
pub use db::{Database, DbHandle, DbWorker};
pub use db_types::{Column, ColumnId, ColumnType, NamedRow, Row, RowId, TableId, Value};
pub use error::DbError;
pub use filter::Filter;
pub use snapshot::Snapshot;
