use std::path::{Path, PathBuf};

use migstep_common::{Error, Result};
use tracing::info;

use crate::model::RunnerConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// `<config dir>/migstep/config.yml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("migstep").join("config.yml"))
    }

    /// Load and validate a config file. The format follows the extension.
    pub fn load(path: &Path) -> Result<RunnerConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = Self::parse(&contents, ext)?;
        config.validate()?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<RunnerConfig> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(RunnerConfig::default()),
        }
    }

    pub fn parse(contents: &str, ext: &str) -> Result<RunnerConfig> {
        match ext {
            "yml" | "yaml" => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
            "toml" => {
                toml::from_str(contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
            }
            other => Err(Error::Config(format!(
                "unsupported config extension: {other}"
            ))),
        }
    }
}
