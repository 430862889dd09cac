use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use migstep_common::{Error, Result};
use migstep_core::{Migration, MigrationLoader};
use regex::Regex;
use tracing::debug;

use crate::migrations::SqlMigration;

static FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9_\-]+?)(?:\.(up|down))?\.sql$")
        .expect("migration file pattern is valid")
});

/// Discovers SQL migrations in a directory.
///
/// Files are named `<version>_<name>.up.sql` and `<version>_<name>.down.sql`;
/// a plain `<version>_<name>.sql` counts as an up script. Other files are
/// ignored.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

#[derive(Default)]
struct Scripts {
    up: Option<String>,
    down: Option<String>,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Discovered migrations as concrete `SqlMigration`s, by ascending version.
    pub fn discover(&self) -> Result<Vec<SqlMigration>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            Error::Config(format!(
                "cannot read migrations directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut found: BTreeMap<(i64, String), Scripts> = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Some(caps) = FILE_PATTERN.captures(file_name) else {
                debug!("skipping {file_name}: not a migration file");
                continue;
            };

            let version: i64 = caps[1].parse().map_err(|e| {
                Error::Config(format!("bad version in {file_name}: {e}"))
            })?;
            let name = caps[2].to_string();
            let sql = std::fs::read_to_string(&path)?;

            let scripts = found.entry((version, name)).or_default();
            let slot = match caps.get(3).map(|m| m.as_str()) {
                Some("down") => &mut scripts.down,
                _ => &mut scripts.up,
            };
            if slot.is_some() {
                return Err(Error::Config(format!(
                    "more than one script for {file_name} in {}",
                    self.dir.display()
                )));
            }
            *slot = Some(sql);
        }

        found
            .into_iter()
            .map(|((version, name), scripts)| {
                let up = scripts.up.ok_or_else(|| {
                    Error::Config(format!(
                        "migration {version}_{name} has a down script but no up script"
                    ))
                })?;
                let mut migration = SqlMigration::new(version, name, up);
                migration.down_sql = scripts.down;
                Ok(migration)
            })
            .collect()
    }
}

impl MigrationLoader for DirectoryLoader {
    fn load(&self) -> Result<Vec<(i64, Arc<dyn Migration>)>> {
        let migrations = self.discover()?;
        debug!(
            "discovered {} migrations in {}",
            migrations.len(),
            self.dir.display()
        );
        Ok(migrations
            .into_iter()
            .map(|m| (m.version, Arc::new(m) as Arc<dyn Migration>))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migstep_core::MigrationRegistry;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn discovers_up_and_down_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0002_add_email.up.sql", "ALTER TABLE users ADD email TEXT;");
        write(dir.path(), "0001_create_users.up.sql", "CREATE TABLE users (id INTEGER);");
        write(dir.path(), "0001_create_users.down.sql", "DROP TABLE users;");
        write(dir.path(), "README.md", "not a migration");

        let migrations = DirectoryLoader::new(dir.path()).discover().unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].name, "create_users");
        assert!(migrations[0].is_reversible());
        assert_eq!(migrations[1].version, 2);
        assert!(!migrations[1].is_reversible());
    }

    #[test]
    fn plain_sql_file_is_an_up_script() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_seed.sql", "INSERT INTO t VALUES (1);");

        let migrations = DirectoryLoader::new(dir.path()).discover().unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].version, 10);
        assert_eq!(migrations[0].up_sql, "INSERT INTO t VALUES (1);");
    }

    #[test]
    fn down_without_up_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0003_orphan.down.sql", "DROP TABLE x;");

        let err = DirectoryLoader::new(dir.path()).discover().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn same_version_different_names_is_a_duplicate_in_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_a.up.sql", "SELECT 1;");
        write(dir.path(), "0001_b.up.sql", "SELECT 2;");

        let loader = DirectoryLoader::new(dir.path());
        assert_eq!(loader.load().unwrap().len(), 2);
        assert!(matches!(
            MigrationRegistry::load(&loader),
            Err(Error::DuplicateVersion { version: 1 })
        ));
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let err = DirectoryLoader::new("/definitely/not/here").discover().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
