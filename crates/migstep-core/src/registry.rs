use std::fmt;
use std::sync::Arc;

use migstep_common::{Error, Result};
use tracing::debug;

use crate::loader::MigrationLoader;
use crate::migration::Migration;

/// A migration bound to its version.
#[derive(Clone)]
pub struct MigrationEntry {
    version: i64,
    migration: Arc<dyn Migration>,
}

impl MigrationEntry {
    pub fn new(version: i64, migration: Arc<dyn Migration>) -> Self {
        Self { version, migration }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn name(&self) -> &str {
        self.migration.name()
    }

    pub fn migration(&self) -> &dyn Migration {
        self.migration.as_ref()
    }
}

impl fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("version", &self.version)
            .field("name", &self.name())
            .finish()
    }
}

/// Known migrations sorted by ascending version.
///
/// Versions need not be contiguous, so stepping happens over ordinal
/// positions. Version `0` means "nothing applied" and maps to ordinal `-1`.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    entries: Vec<MigrationEntry>,
}

impl MigrationRegistry {
    pub fn load(loader: &dyn MigrationLoader) -> Result<Self> {
        let registry = Self::from_entries(
            loader
                .load()?
                .into_iter()
                .map(|(version, migration)| MigrationEntry::new(version, migration)),
        )?;
        debug!(
            "loaded {} migrations (latest version {})",
            registry.len(),
            registry.latest_version()
        );
        Ok(registry)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = MigrationEntry>) -> Result<Self> {
        let mut entries: Vec<MigrationEntry> = entries.into_iter().collect();

        if let Some(bad) = entries.iter().find(|e| e.version <= 0) {
            return Err(Error::Validation(format!(
                "migration '{}' has version {}; versions must be positive",
                bad.name(),
                bad.version
            )));
        }

        entries.sort_by_key(|e| e.version);
        if let Some(pair) = entries.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(Error::DuplicateVersion {
                version: pair[0].version,
            });
        }

        Ok(Self { entries })
    }

    /// Ordinal position of `version`, if registered.
    pub fn index_of(&self, version: i64) -> Option<usize> {
        self.entries
            .binary_search_by_key(&version, |e| e.version)
            .ok()
    }

    /// Steppable coordinate for `version`: `-1` for version `0`, otherwise
    /// its ordinal position.
    pub fn ordinal(&self, version: i64) -> Result<isize> {
        if version == 0 {
            return Ok(-1);
        }
        self.index_of(version)
            .map(|idx| idx as isize)
            .ok_or(Error::UnknownVersion(version))
    }

    /// Version the database is at once every migration up to and including
    /// `ordinal` has been applied. Negative ordinals mean nothing applied.
    pub fn version_at(&self, ordinal: isize) -> i64 {
        if ordinal < 0 {
            return 0;
        }
        self.entries
            .get(ordinal as usize)
            .map(|e| e.version)
            .unwrap_or(0)
    }

    pub fn entry_at(&self, ordinal: isize) -> Option<&MigrationEntry> {
        if ordinal < 0 {
            return None;
        }
        self.entries.get(ordinal as usize)
    }

    pub fn get(&self, version: i64) -> Option<&MigrationEntry> {
        self.index_of(version).map(|idx| &self.entries[idx])
    }

    pub fn contains(&self, version: i64) -> bool {
        self.index_of(version).is_some()
    }

    /// Highest registered version, or `0` when empty.
    pub fn latest_version(&self) -> i64 {
        self.entries.last().map(|e| e.version).unwrap_or(0)
    }

    pub fn versions(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.version).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MigrationSet;
    use crate::migration::MigrationContext;

    struct Noop(&'static str);

    impl Migration for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn up(&self, _ctx: &mut MigrationContext<'_>) -> Result<()> {
            Ok(())
        }

        fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn sparse() -> MigrationRegistry {
        let set = MigrationSet::new()
            .with(5, Noop("m5"))
            .with(1, Noop("m1"))
            .with(2, Noop("m2"));
        MigrationRegistry::load(&set).unwrap()
    }

    #[test]
    fn entries_are_sorted_by_version() {
        let registry = sparse();
        assert_eq!(registry.versions(), vec![1, 2, 5]);
        let names: Vec<_> = registry.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["m1", "m2", "m5"]);
        assert_eq!(registry.latest_version(), 5);
    }

    #[test]
    fn ordinals_ignore_gaps_between_versions() {
        let registry = sparse();
        assert_eq!(registry.index_of(1), Some(0));
        assert_eq!(registry.index_of(5), Some(2));
        assert_eq!(registry.index_of(3), None);

        assert_eq!(registry.ordinal(0).unwrap(), -1);
        assert_eq!(registry.ordinal(2).unwrap(), 1);
        assert!(matches!(
            registry.ordinal(4),
            Err(Error::UnknownVersion(4))
        ));

        assert_eq!(registry.version_at(-1), 0);
        assert_eq!(registry.version_at(1), 2);
        assert!(registry.entry_at(-1).is_none());
        assert_eq!(registry.entry_at(2).map(|e| e.version()), Some(5));
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let set = MigrationSet::new()
            .with(1, Noop("a"))
            .with(2, Noop("b"))
            .with(1, Noop("c"));
        let err = MigrationRegistry::load(&set).unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion { version: 1 }));
    }

    #[test]
    fn distinct_versions_never_collide() {
        for versions in [vec![1], vec![3, 1, 2], vec![10, 20, 30, 40], vec![7, 100]] {
            let set = versions
                .iter()
                .fold(MigrationSet::new(), |set, v| set.with(*v, Noop("x")));
            let registry = MigrationRegistry::load(&set).unwrap();
            assert_eq!(registry.len(), versions.len());
        }
    }

    #[test]
    fn non_positive_versions_are_rejected() {
        let set = MigrationSet::new().with(0, Noop("zero"));
        assert!(matches!(
            MigrationRegistry::load(&set),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn empty_registry_has_latest_zero() {
        let registry = MigrationRegistry::load(&MigrationSet::new()).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.latest_version(), 0);
    }
}
