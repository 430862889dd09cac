use std::path::Path;

use migstep_common::{Error, Result};
use migstep_core::{Column, ColumnType, Processor, TableData, Value, check_row_shape};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info};

use crate::validation::IdentifierValidator;

/// `Processor` backed by a SQLite database.
pub struct SqliteProcessor {
    conn: Connection,
}

impl SqliteProcessor {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening sqlite database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("failed to open database: {e}")))?;
        Self::configure(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("failed to open in-memory database: {e}")))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Storage(format!("failed to set pragmas: {e}")))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Processor for SqliteProcessor {
    fn table_exists(&self, name: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT count(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(format!("failed to check table {name}: {e}")))
    }

    fn create_table(&mut self, name: &str, columns: &[Column]) -> Result<()> {
        IdentifierValidator::validate(name)?;
        IdentifierValidator::validate_all(columns.iter().map(|c| c.name.as_str()))?;

        let defs: Vec<String> = columns
            .iter()
            .map(|c| {
                let ty = match c.column_type {
                    ColumnType::Integer => "INTEGER",
                    ColumnType::Text => "TEXT",
                };
                format!("\"{}\" {ty}", c.name)
            })
            .collect();
        let sql = format!("CREATE TABLE \"{name}\" ({})", defs.join(", "));
        debug!("{sql}");
        self.conn
            .execute_batch(&sql)
            .map_err(|e| Error::Storage(format!("failed to create table {name}: {e}")))
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        IdentifierValidator::validate(name)?;
        self.conn
            .execute_batch(&format!("DROP TABLE \"{name}\""))
            .map_err(|e| Error::Storage(format!("failed to drop table {name}: {e}")))
    }

    fn read_table_data(&self, name: &str) -> Result<TableData> {
        IdentifierValidator::validate(name)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM \"{name}\""))
            .map_err(|e| Error::Storage(format!("failed to prepare query: {e}")))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(from_sql))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(|e| Error::Storage(format!("failed to query {name}: {e}")))?;

        let mut data = TableData::new(columns);
        for row in rows {
            data.rows.push(
                row.map_err(|e| Error::Storage(format!("failed to read {name} row: {e}")))?,
            );
        }
        Ok(data)
    }

    fn update_table(&mut self, name: &str, columns: &[&str], values: &[Value]) -> Result<()> {
        check_row_shape(columns, values)?;
        IdentifierValidator::validate(name)?;
        IdentifierValidator::validate_all(columns.iter().copied())?;

        let column_list = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Storage(format!("failed to begin transaction: {e}")))?;
        tx.execute(&format!("DELETE FROM \"{name}\""), [])
            .map_err(|e| Error::Storage(format!("failed to clear {name}: {e}")))?;
        tx.execute(
            &format!("INSERT INTO \"{name}\" ({column_list}) VALUES ({placeholders})"),
            params_from_iter(values.iter().map(to_sql)),
        )
        .map_err(|e| Error::Storage(format!("failed to write {name}: {e}")))?;
        tx.commit()
            .map_err(|e| Error::Storage(format!("failed to commit {name}: {e}")))
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::Storage(format!("statement failed: {e}")))
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Null => SqlValue::Null,
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Text(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
