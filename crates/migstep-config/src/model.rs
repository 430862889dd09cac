use std::path::PathBuf;

use migstep_common::{Error, Result};
use migstep_core::{DEFAULT_VERSION_TABLE, RunnerOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Directory holding `<version>_<name>.up.sql` / `.down.sql` files.
    pub migrations_dir: PathBuf,
    pub version_table: String,
    /// Revert completed steps when an upgrade fails part way.
    pub auto_rollback: bool,
    /// Skip failing statements inside a migration instead of aborting it.
    pub tolerant: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("migstep.db"),
            migrations_dir: PathBuf::from("migrations"),
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            auto_rollback: true,
            tolerant: false,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(Error::Config("database path cannot be empty".into()));
        }
        if self.version_table.trim().is_empty() {
            return Err(Error::Config("version_table cannot be empty".into()));
        }
        Ok(())
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            version_table: self.version_table.clone(),
            tolerant: self.tolerant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunnerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.auto_rollback);
        assert!(!config.tolerant);
        assert_eq!(config.runner_options(), RunnerOptions::default());
    }

    #[test]
    fn empty_fields_are_rejected() {
        let config = RunnerConfig {
            version_table: " ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = RunnerConfig {
            database: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
