use std::fmt;

use migstep_common::{Direction, Result};
use serde::Serialize;
use tracing::warn;

use crate::processor::Processor;

/// A unit of schema change with a forward and a backward operation.
///
/// The version a migration runs under is assigned by its loader, not by the
/// migration itself.
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;
}

/// A failure swallowed inside a single migration while running tolerant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedFailure {
    pub version: i64,
    pub direction: Direction,
    pub statement: Option<String>,
    pub message: String,
}

impl fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "migration {} ({}): {}", self.version, self.direction, self.message)?;
        if let Some(statement) = &self.statement {
            write!(f, " [{statement}]")?;
        }
        Ok(())
    }
}

/// What a migration body sees while it runs.
pub struct MigrationContext<'a> {
    processor: &'a mut dyn Processor,
    version: i64,
    direction: Direction,
    tolerant: bool,
    captured: Vec<CapturedFailure>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(
        processor: &'a mut dyn Processor,
        version: i64,
        direction: Direction,
        tolerant: bool,
    ) -> Self {
        Self {
            processor,
            version,
            direction,
            tolerant,
            captured: Vec::new(),
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }

    /// Direct access to the processor. Errors raised through it are never
    /// captured, even in tolerant mode.
    pub fn processor(&mut self) -> &mut dyn Processor {
        &mut *self.processor
    }

    /// Run one statement. In tolerant mode a failing statement is recorded
    /// and the migration carries on with its next statement.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        match self.processor.execute(sql) {
            Ok(()) => Ok(()),
            Err(e) if self.tolerant => {
                warn!(
                    "migration {} ({}): ignoring failed statement: {e}",
                    self.version, self.direction
                );
                self.captured.push(CapturedFailure {
                    version: self.version,
                    direction: self.direction,
                    statement: Some(sql.to_string()),
                    message: e.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn captured(&self) -> &[CapturedFailure] {
        &self.captured
    }

    pub fn into_captured(self) -> Vec<CapturedFailure> {
        self.captured
    }
}

/// Outcome of applying one migration. Captured failures are reported even
/// when the migration itself went on to fail.
#[derive(Debug)]
pub struct ApplyReport {
    pub captured: Vec<CapturedFailure>,
    pub outcome: Result<()>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Applies a single migration in one direction against a processor.
pub trait MigrationExecutor {
    fn apply(
        &self,
        processor: &mut dyn Processor,
        version: i64,
        migration: &dyn Migration,
        direction: Direction,
        tolerant: bool,
    ) -> ApplyReport;
}

/// Runs the migration body directly and passes its error through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExecutor;

impl MigrationExecutor for DefaultExecutor {
    fn apply(
        &self,
        processor: &mut dyn Processor,
        version: i64,
        migration: &dyn Migration,
        direction: Direction,
        tolerant: bool,
    ) -> ApplyReport {
        let mut ctx = MigrationContext::new(processor, version, direction, tolerant);
        let outcome = match direction {
            Direction::Up => migration.up(&mut ctx),
            Direction::Down => migration.down(&mut ctx),
        };
        ApplyReport {
            captured: ctx.into_captured(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProcessor;
    use migstep_common::Error;

    struct TwoStatements;

    impl Migration for TwoStatements {
        fn name(&self) -> &str {
            "two_statements"
        }

        fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
            ctx.execute("CREATE TABLE broken")?;
            ctx.execute("CREATE TABLE fine")
        }

        fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<()> {
            Err(Error::Other("irreversible".into()))
        }
    }

    #[test]
    fn strict_mode_stops_at_first_failed_statement() {
        let mut processor = MemoryProcessor::new();
        processor.fail_on("broken");

        let report = DefaultExecutor.apply(&mut processor, 3, &TwoStatements, Direction::Up, false);
        assert!(!report.is_success());
        assert!(report.captured.is_empty());
        assert!(processor.executed().is_empty());
    }

    #[test]
    fn tolerant_mode_captures_and_continues() {
        let mut processor = MemoryProcessor::new();
        processor.fail_on("broken");

        let report = DefaultExecutor.apply(&mut processor, 3, &TwoStatements, Direction::Up, true);
        assert!(report.is_success());
        assert_eq!(report.captured.len(), 1);
        assert_eq!(report.captured[0].version, 3);
        assert_eq!(report.captured[0].direction, Direction::Up);
        assert_eq!(
            report.captured[0].statement.as_deref(),
            Some("CREATE TABLE broken")
        );
        assert_eq!(processor.executed(), ["CREATE TABLE fine"]);
    }

    #[test]
    fn migration_errors_pass_through_unchanged() {
        let mut processor = MemoryProcessor::new();
        let report =
            DefaultExecutor.apply(&mut processor, 3, &TwoStatements, Direction::Down, true);
        match report.outcome {
            Err(Error::Other(msg)) => assert_eq!(msg, "irreversible"),
            other => panic!("expected pass-through error, got {other:?}"),
        }
    }

    #[test]
    fn captured_failure_display() {
        let failure = CapturedFailure {
            version: 2,
            direction: Direction::Down,
            statement: Some("DROP TABLE x".into()),
            message: "no such table: x".into(),
        };
        assert_eq!(
            failure.to_string(),
            "migration 2 (down): no such table: x [DROP TABLE x]"
        );
    }
}
