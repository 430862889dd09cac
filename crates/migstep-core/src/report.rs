use migstep_common::Direction;
use serde::Serialize;

use crate::migration::CapturedFailure;

/// Result of one walk through the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub from: i64,
    pub to: i64,
    pub direction: Direction,
    /// Version the database was left at. Equals `from` when nothing ran.
    pub last_version: i64,
    /// Versions whose migration completed, in the order they ran.
    pub applied: Vec<i64>,
    pub captured: Vec<CapturedFailure>,
}

impl StepReport {
    pub fn new(from: i64, to: i64, direction: Direction) -> Self {
        Self {
            from,
            to,
            direction,
            last_version: from,
            applied: Vec::new(),
            captured: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }

    /// True when every step ran but some statements were swallowed.
    pub fn is_degraded(&self) -> bool {
        !self.captured.is_empty()
    }
}

/// Failures captured in tolerant mode, kept until the caller clears them.
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    entries: Vec<CapturedFailure>,
}

impl FailureLog {
    pub fn extend<I: IntoIterator<Item = CapturedFailure>>(&mut self, failures: I) {
        self.entries.extend(failures);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedFailure> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[CapturedFailure] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationState {
    pub version: i64,
    pub name: String,
    pub applied: bool,
}

/// Snapshot of which registered migrations are applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub current_version: i64,
    pub previous_version: i64,
    pub latest_version: i64,
    pub migrations: Vec<MigrationState>,
}

impl MigrationStatus {
    pub fn pending(&self) -> Vec<i64> {
        self.migrations
            .iter()
            .filter(|m| !m.applied)
            .map(|m| m.version)
            .collect()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.current_version == self.latest_version
    }
}
