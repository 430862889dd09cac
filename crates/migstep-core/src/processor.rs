use std::fmt;

use migstep_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single cell read from or written to a tracking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Text,
}

/// Column definition used when a processor has to create a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Integer,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
        }
    }
}

/// Rows read back from a table, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell at `row` for the named column, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Storage backend the runner talks to.
///
/// The version-tracking code only needs `table_exists`, `create_table`,
/// `read_table_data` and `update_table`. Migration bodies go through
/// `execute`.
pub trait Processor {
    fn table_exists(&self, name: &str) -> Result<bool>;

    fn create_table(&mut self, name: &str, columns: &[Column]) -> Result<()>;

    fn drop_table(&mut self, name: &str) -> Result<()>;

    fn read_table_data(&self, name: &str) -> Result<TableData>;

    /// Replace the contents of `name` with a single row. Columns not listed
    /// are written as NULL.
    fn update_table(&mut self, name: &str, columns: &[&str], values: &[Value]) -> Result<()>;

    fn execute(&mut self, sql: &str) -> Result<()>;
}

/// Reject an `update_table` call whose column and value lists disagree.
pub fn check_row_shape(columns: &[&str], values: &[Value]) -> Result<()> {
    if columns.len() != values.len() {
        return Err(Error::Storage(format!(
            "column/value count mismatch: {} columns, {} values",
            columns.len(),
            values.len()
        )));
    }
    Ok(())
}
