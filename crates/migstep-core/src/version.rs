use chrono::{DateTime, NaiveDateTime, Utc};
use migstep_common::{Direction, Error, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::migration::{Migration, MigrationContext, MigrationExecutor};
use crate::processor::{Column, Processor, TableData, Value};

pub const DEFAULT_VERSION_TABLE: &str = "VersionInfo";
pub const CURRENT_VERSION_COLUMN: &str = "CurrentVersion";
pub const PREVIOUS_VERSION_COLUMN: &str = "PreviousVersion";
pub const LAST_UPDATED_COLUMN: &str = "LastUpdated";

/// Persisted position of the database in its migration history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionInfo {
    pub current_version: i64,
    pub previous_version: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Bootstrap migration that creates the version-tracking table.
pub struct VersionTableMigration {
    table: String,
}

impl VersionTableMigration {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn columns() -> Vec<Column> {
        vec![
            Column::integer(CURRENT_VERSION_COLUMN),
            Column::integer(PREVIOUS_VERSION_COLUMN),
            Column::text(LAST_UPDATED_COLUMN),
        ]
    }
}

impl Migration for VersionTableMigration {
    fn name(&self) -> &str {
        "create_version_table"
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.processor().create_table(&self.table, &Self::columns())
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.processor().drop_table(&self.table)
    }
}

/// Reads and writes the single-row version table.
#[derive(Debug, Clone)]
pub struct VersionStore {
    table: String,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION_TABLE)
    }
}

impl VersionStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Create the version table if it is missing, then read it.
    pub fn load_version_info(
        &self,
        processor: &mut dyn Processor,
        executor: &dyn MigrationExecutor,
    ) -> Result<VersionInfo> {
        let exists = processor
            .table_exists(&self.table)
            .map_err(|e| Error::Storage(format!("failed to check version table: {e}")))?;

        if !exists {
            info!("creating version table {}", self.table);
            let bootstrap = VersionTableMigration::new(self.table.clone());
            executor
                .apply(processor, 0, &bootstrap, Direction::Up, false)
                .outcome
                .map_err(|e| {
                    Error::Storage(format!(
                        "failed to create version table {}: {e}",
                        self.table
                    ))
                })?;
        }

        self.read_version_info(processor)
    }

    /// Read the version row without bootstrapping.
    pub fn read_version_info(&self, processor: &dyn Processor) -> Result<VersionInfo> {
        let data = processor.read_table_data(&self.table).map_err(|e| {
            Error::Storage(format!("failed to read version table {}: {e}", self.table))
        })?;
        parse_version_info(&self.table, &data)
    }

    /// Write a new version row and read it back.
    pub fn save_version_state(
        &self,
        processor: &mut dyn Processor,
        current: i64,
        previous: i64,
    ) -> Result<VersionInfo> {
        let now = Utc::now().to_rfc3339();
        processor
            .update_table(
                &self.table,
                &[
                    CURRENT_VERSION_COLUMN,
                    PREVIOUS_VERSION_COLUMN,
                    LAST_UPDATED_COLUMN,
                ],
                &[
                    Value::Integer(current),
                    Value::Integer(previous),
                    Value::Text(now),
                ],
            )
            .map_err(|e| Error::Storage(format!("failed to save version state: {e}")))?;

        let info = self.read_version_info(processor)?;
        if info.current_version != current || info.previous_version != previous {
            return Err(Error::Storage(format!(
                "version table {} reads back ({}, {}) after writing ({current}, {previous})",
                self.table, info.current_version, info.previous_version
            )));
        }
        debug!("saved version state: current={current} previous={previous}");
        Ok(info)
    }
}

fn parse_version_info(table: &str, data: &TableData) -> Result<VersionInfo> {
    match data.row_count() {
        0 => return Ok(VersionInfo::default()),
        1 => {}
        n => {
            return Err(Error::Storage(format!(
                "version table {table} holds {n} rows, expected one"
            )));
        }
    }

    let integer = |column: &str| -> Result<i64> {
        match data.get(0, column) {
            Some(Value::Integer(v)) => Ok(*v),
            Some(Value::Null) => Ok(0),
            Some(other) => Err(Error::Storage(format!(
                "version table {table}: {column} is not an integer: {other}"
            ))),
            None => Err(Error::Storage(format!(
                "version table {table} is missing column {column}"
            ))),
        }
    };

    let last_updated = match data.get(0, LAST_UPDATED_COLUMN) {
        Some(Value::Text(s)) => Some(parse_datetime(s).ok_or_else(|| {
            Error::Storage(format!(
                "version table {table}: unreadable {LAST_UPDATED_COLUMN} '{s}'"
            ))
        })?),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(Error::Storage(format!(
                "version table {table}: {LAST_UPDATED_COLUMN} is not text: {other}"
            )));
        }
    };

    Ok(VersionInfo {
        current_version: integer(CURRENT_VERSION_COLUMN)?,
        previous_version: integer(PREVIOUS_VERSION_COLUMN)?,
        last_updated,
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}
