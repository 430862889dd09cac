use std::collections::BTreeMap;

use migstep_common::{Error, Result};
use tracing::debug;

use crate::processor::{Column, Processor, TableData, Value, check_row_shape};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

/// Connectionless processor that keeps tables in memory and records every
/// executed statement instead of running it.
///
/// Useful for previewing the statements a run would issue, and as the
/// backing store in tests. Statements matching a registered failure pattern
/// are rejected.
#[derive(Debug, Default)]
pub struct MemoryProcessor {
    tables: BTreeMap<String, MemoryTable>,
    executed: Vec<String>,
    rejected_patterns: Vec<String>,
    writes: usize,
}

impl MemoryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any later statement containing `pattern`.
    pub fn fail_on(&mut self, pattern: impl Into<String>) {
        self.rejected_patterns.push(pattern.into());
    }

    pub fn clear_failures(&mut self) {
        self.rejected_patterns.clear();
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Number of successful `update_table` calls.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Append a raw row, bypassing the single-row upsert. Lets callers stage
    /// arbitrary table contents.
    pub fn insert_row(&mut self, name: &str, row: Vec<Value>) -> Result<()> {
        let table = self.table_mut(name)?;
        if row.len() != table.columns.len() {
            return Err(Error::Storage(format!(
                "row has {} values but table {name} has {} columns",
                row.len(),
                table.columns.len()
            )));
        }
        table.rows.push(row);
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::Storage(format!("no such table: {name}")))
    }
}

impl Processor for MemoryProcessor {
    fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tables.contains_key(name))
    }

    fn create_table(&mut self, name: &str, columns: &[Column]) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(Error::Storage(format!("table {name} already exists")));
        }
        debug!("memory processor: create table {name}");
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::Storage(format!("no such table: {name}")))
    }

    fn read_table_data(&self, name: &str) -> Result<TableData> {
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| Error::Storage(format!("no such table: {name}")))?;
        Ok(TableData {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            rows: table.rows.clone(),
        })
    }

    fn update_table(&mut self, name: &str, columns: &[&str], values: &[Value]) -> Result<()> {
        check_row_shape(columns, values)?;
        let table = self.table_mut(name)?;

        let mut row = vec![Value::Null; table.columns.len()];
        for (column, value) in columns.iter().zip(values) {
            let idx = table
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(column))
                .ok_or_else(|| Error::Storage(format!("no such column: {name}.{column}")))?;
            row[idx] = value.clone();
        }
        table.rows = vec![row];
        self.writes += 1;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        if let Some(pattern) = self
            .rejected_patterns
            .iter()
            .find(|p| sql.contains(p.as_str()))
        {
            return Err(Error::Storage(format!(
                "statement rejected ({pattern}): {sql}"
            )));
        }
        self.executed.push(sql.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_columns() -> Vec<Column> {
        vec![Column::integer("CurrentVersion"), Column::text("LastUpdated")]
    }

    #[test]
    fn create_and_drop_table() {
        let mut p = MemoryProcessor::new();
        assert!(!p.table_exists("t").unwrap());

        p.create_table("t", &version_columns()).unwrap();
        assert!(p.table_exists("t").unwrap());
        assert!(p.create_table("t", &version_columns()).is_err());

        p.drop_table("t").unwrap();
        assert!(!p.table_exists("t").unwrap());
        assert!(p.drop_table("t").is_err());
    }

    #[test]
    fn update_table_keeps_a_single_row() {
        let mut p = MemoryProcessor::new();
        p.create_table("t", &version_columns()).unwrap();

        p.update_table("t", &["CurrentVersion"], &[Value::Integer(1)])
            .unwrap();
        p.update_table(
            "t",
            &["CurrentVersion", "LastUpdated"],
            &[Value::Integer(2), Value::from("now")],
        )
        .unwrap();

        let data = p.read_table_data("t").unwrap();
        assert_eq!(data.row_count(), 1);
        assert_eq!(data.get(0, "CurrentVersion"), Some(&Value::Integer(2)));
        assert_eq!(p.write_count(), 2);
    }

    #[test]
    fn update_missing_column_fails() {
        let mut p = MemoryProcessor::new();
        p.create_table("t", &version_columns()).unwrap();
        let err = p
            .update_table("t", &["Nope"], &[Value::Integer(1)])
            .unwrap_err();
        assert!(err.to_string().contains("no such column"));
        assert_eq!(p.write_count(), 0);
    }

    #[test]
    fn execute_records_and_rejects() {
        let mut p = MemoryProcessor::new();
        p.execute("CREATE TABLE a (id INTEGER)").unwrap();
        p.fail_on("DROP");
        assert!(p.execute("DROP TABLE a").is_err());
        assert_eq!(p.executed(), ["CREATE TABLE a (id INTEGER)"]);

        p.clear_failures();
        p.execute("DROP TABLE a").unwrap();
        assert_eq!(p.executed().len(), 2);
    }
}
