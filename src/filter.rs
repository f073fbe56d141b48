//! Filter evaluation.
//!
//! A filter maps a field name to a list of conditions. Each condition is an
//! operator character followed by a literal operand, e.g. `"<no"` or `"!42"`.
//! A row matches when every condition on every field holds.
//!
//! | op  | number        | string           | bool     |
//! |-----|---------------|------------------|----------|
//! | `=` | equal         | equal            | equal    |
//! | `!` | not equal     | not equal        | not equal|
//! | `<` | less than     | starts with      | –        |
//! | `>` | greater than  | ends with        | –        |
//! | `.` | –             | contains         | –        |
//!
//! The reserved field `id` refers to the row id and is compared as a number.
//! Filters are compiled against the schema before any row is scanned, so a
//! malformed condition fails the query as a whole.

use std::collections::BTreeMap;

use crate::db::Database;
use crate::db_types::{ColumnId, ColumnType, NamedRow, Row, RowId, TableId, TableSchema, Value};
use crate::error::DbError;

pub type Filter = BTreeMap<String, Vec<String>>;

pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    Greater,
    Contains,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '=' => Some(Operator::Equal),
            '!' => Some(Operator::NotEqual),
            '<' => Some(Operator::Less),
            '>' => Some(Operator::Greater),
            '.' => Some(Operator::Contains),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operator::Equal => '=',
            Operator::NotEqual => '!',
            Operator::Less => '<',
            Operator::Greater => '>',
            Operator::Contains => '.',
        }
    }

    pub fn allowed_on(self, col_type: ColumnType) -> bool {
        match self {
            Operator::Equal | Operator::NotEqual => true,
            Operator::Less | Operator::Greater => col_type != ColumnType::Bool,
            Operator::Contains => col_type == ColumnType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: Operator,
    pub operand: Value,
}

impl Condition {
    /// Parses `raw` for a field of type `col_type`.
    pub fn parse(raw: &str, col_type: ColumnType) -> Result<Self, DbError> {
        let mut chars = raw.chars();
        let Some(symbol) = chars.next() else {
            return Err(malformed(raw, "empty condition"));
        };
        let op = Operator::from_char(symbol)
            .filter(|op| op.allowed_on(col_type))
            .ok_or(DbError::InvalidOperator {
                operator: symbol,
                column_type: col_type,
            })?;

        let literal = chars.as_str();
        let operand = match col_type {
            ColumnType::Number => literal
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| malformed(raw, "operand is not a number"))?,
            ColumnType::Text => Value::Text(literal.to_string()),
            ColumnType::Bool => match literal {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(malformed(raw, "only true and false are allowed")),
            },
        };
        Ok(Self { op, operand })
    }

    pub fn matches(&self, value: &Value) -> bool {
        use Value::*;

        match (self.op, value, &self.operand) {
            (Operator::Equal, a, b) => a == b,
            (Operator::NotEqual, a, b) => a != b,
            (Operator::Less, Number(a), Number(b)) => a < b,
            (Operator::Less, Text(a), Text(b)) => a.starts_with(b.as_str()),
            (Operator::Greater, Number(a), Number(b)) => a > b,
            (Operator::Greater, Text(a), Text(b)) => a.ends_with(b.as_str()),
            (Operator::Contains, Text(a), Text(b)) => a.contains(b.as_str()),
            _ => false,
        }
    }
}

fn malformed(condition: &str, reason: &str) -> DbError {
    DbError::MalformedCondition {
        condition: condition.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Column(ColumnId),
}

#[derive(Debug, Clone)]
struct Predicate {
    field: Field,
    conditions: Vec<Condition>,
}

/// A filter resolved against one table's schema.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    predicates: Vec<Predicate>,
}

impl CompiledFilter {
    pub fn compile(schema: &TableSchema, filter: &Filter) -> Result<Self, DbError> {
        let mut predicates = Vec::with_capacity(filter.len());
        for (name, raw_conditions) in filter {
            let (field, col_type) = if name == ID_FIELD {
                (Field::Id, ColumnType::Number)
            } else {
                let column = schema
                    .columns
                    .iter()
                    .find(|c| &c.name == name)
                    .ok_or_else(|| DbError::ColumnNotFound(name.clone()))?;
                (Field::Column(column.id), column.col_type)
            };

            let conditions = raw_conditions
                .iter()
                .map(|raw| Condition::parse(raw, col_type))
                .collect::<Result<Vec<_>, _>>()?;
            predicates.push(Predicate { field, conditions });
        }
        Ok(Self { predicates })
    }

    /// A row lacking a value for a filtered column never matches.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|predicate| {
            let id_value;
            let value = match predicate.field {
                Field::Id => {
                    id_value = Value::Number(row.id as f64);
                    &id_value
                }
                Field::Column(id) => match row.values.get(&id) {
                    Some(value) => value,
                    None => return false,
                },
            };
            predicate.conditions.iter().all(|cond| cond.matches(value))
        })
    }
}

impl Database {
    pub fn matching_row_ids(&self, table: TableId, filter: &Filter) -> Result<Vec<RowId>, DbError> {
        let table_def = self.table(table)?;
        let compiled = CompiledFilter::compile(&table_def.schema, filter)?;
        Ok(table_def
            .rows
            .iter()
            .filter(|row| compiled.matches(row))
            .map(|row| row.id)
            .collect())
    }

    /// Returns the matching rows in row order, keyed by column name.
    pub fn search(&self, table: TableId, filter: &Filter) -> Result<Vec<NamedRow>, DbError> {
        let table_def = self.table(table)?;
        let compiled = CompiledFilter::compile(&table_def.schema, filter)?;
        Ok(table_def
            .rows
            .iter()
            .filter(|row| compiled.matches(row))
            .map(|row| table_def.named_row(row))
            .collect())
    }
}
