use std::sync::Arc;

use migstep_common::Result;

use crate::migration::Migration;

/// Discovers the migrations available to a runner.
///
/// Loaders report what they find as-is; ordering and duplicate detection
/// belong to the registry.
pub trait MigrationLoader {
    fn load(&self) -> Result<Vec<(i64, Arc<dyn Migration>)>>;
}

/// Migrations declared in code.
#[derive(Default, Clone)]
pub struct MigrationSet {
    migrations: Vec<(i64, Arc<dyn Migration>)>,
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, version: i64, migration: impl Migration + 'static) -> Self {
        self.push(version, Arc::new(migration));
        self
    }

    pub fn push(&mut self, version: i64, migration: Arc<dyn Migration>) {
        self.migrations.push((version, migration));
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl MigrationLoader for MigrationSet {
    fn load(&self) -> Result<Vec<(i64, Arc<dyn Migration>)>> {
        Ok(self.migrations.clone())
    }
}
