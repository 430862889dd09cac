use migstep_common::{Error, Result};
use migstep_core::{Migration, MigrationContext};

/// Scripts starting with this marker are executed as one batch instead of
/// being split on `;`. Needed for triggers and other bodies that contain
/// semicolons.
pub const NO_SPLIT_MARKER: &str = "-- migstep:no-split";

/// A migration made of SQL scripts.
///
/// Each script is split into `;`-separated statements which run one at a
/// time, so tolerant mode can skip an individual failing statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub down_sql: Option<String>,
}

impl SqlMigration {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: None,
        }
    }

    pub fn with_down(mut self, down_sql: impl Into<String>) -> Self {
        self.down_sql = Some(down_sql.into());
        self
    }

    pub fn is_reversible(&self) -> bool {
        self.down_sql.is_some()
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        run_script(ctx, &self.up_sql)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        match &self.down_sql {
            Some(sql) => run_script(ctx, sql),
            None => Err(Error::migration(
                self.version,
                format!("{} has no down script", self.name),
            )),
        }
    }
}

fn run_script(ctx: &mut MigrationContext<'_>, sql: &str) -> Result<()> {
    for statement in split_statements(sql) {
        ctx.execute(statement)?;
    }
    Ok(())
}

/// Split a script on `;`, dropping empty and comment-only fragments.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let trimmed = sql.trim_start();
    if trimmed.starts_with(NO_SPLIT_MARKER) {
        return vec![trimmed];
    }
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_comment_only(s))
        .collect()
}

fn is_comment_only(fragment: &str) -> bool {
    fragment
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteProcessor;
    use migstep_common::Direction;
    use migstep_core::{DefaultExecutor, MemoryProcessor, MigrationExecutor, Processor};

    #[test]
    fn splits_statements_and_skips_comments() {
        let sql = "-- users\nCREATE TABLE users (id INTEGER);\n\nCREATE INDEX idx ON users(id);\n-- trailing\n";
        assert_eq!(
            split_statements(sql),
            vec![
                "-- users\nCREATE TABLE users (id INTEGER)",
                "CREATE INDEX idx ON users(id)"
            ]
        );
    }

    #[test]
    fn no_split_marker_keeps_the_script_whole() {
        let sql = "-- migstep:no-split\nCREATE TRIGGER t AFTER INSERT ON a BEGIN SELECT 1; END;";
        assert_eq!(split_statements(sql).len(), 1);
    }

    #[test]
    fn up_and_down_run_against_sqlite() {
        let mut p = SqliteProcessor::in_memory().unwrap();
        let migration = SqlMigration::new(
            1,
            "create_users",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);
             CREATE INDEX idx_users_email ON users(email);",
        )
        .with_down("DROP TABLE users;");

        let report = DefaultExecutor.apply(&mut p, 1, &migration, Direction::Up, false);
        assert!(report.is_success());
        assert!(p.table_exists("users").unwrap());

        let report = DefaultExecutor.apply(&mut p, 1, &migration, Direction::Down, false);
        assert!(report.is_success());
        assert!(!p.table_exists("users").unwrap());
    }

    #[test]
    fn missing_down_script_fails() {
        let mut p = MemoryProcessor::new();
        let migration = SqlMigration::new(3, "seed", "INSERT INTO a VALUES (1)");
        assert!(!migration.is_reversible());

        let report = DefaultExecutor.apply(&mut p, 3, &migration, Direction::Down, false);
        assert!(matches!(
            report.outcome,
            Err(Error::Migration { version: 3, .. })
        ));
        assert_eq!(
            report.outcome.unwrap_err().to_string(),
            "migration 3 failed: seed has no down script"
        );
    }

    #[test]
    fn tolerant_mode_skips_bad_statements() {
        let mut p = SqliteProcessor::in_memory().unwrap();
        let migration = SqlMigration::new(
            2,
            "mixed",
            "INSERT INTO missing VALUES (1); CREATE TABLE kept (id INTEGER);",
        );

        let report = DefaultExecutor.apply(&mut p, 2, &migration, Direction::Up, true);
        assert!(report.is_success());
        assert_eq!(report.captured.len(), 1);
        assert_eq!(
            report.captured[0].statement.as_deref(),
            Some("INSERT INTO missing VALUES (1)")
        );
        assert!(p.table_exists("kept").unwrap());
    }
}
