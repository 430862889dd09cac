use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Which way a migration walk moves through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("duplicate migration version: {version}")]
    DuplicateVersion { version: i64 },

    #[error("cannot step {direction} from version {from} to version {to}")]
    InvalidDirection {
        from: i64,
        to: i64,
        direction: Direction,
    },

    #[error("unknown migration version: {0}")]
    UnknownVersion(i64),

    #[error("persisted version {0} does not match any known migration")]
    InconsistentState(i64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("migration {version} failed: {message}")]
    Migration { version: i64, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a failure raised while applying the migration at `version`.
    pub fn migration(version: i64, err: impl fmt::Display) -> Self {
        Error::Migration {
            version,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Error};

    #[test]
    fn error_display_includes_context() {
        let e = Error::DuplicateVersion { version: 7 };
        assert_eq!(e.to_string(), "duplicate migration version: 7");

        let e = Error::InvalidDirection {
            from: 5,
            to: 2,
            direction: Direction::Up,
        };
        assert_eq!(e.to_string(), "cannot step up from version 5 to version 2");

        let e = Error::InconsistentState(42);
        assert_eq!(
            e.to_string(),
            "persisted version 42 does not match any known migration"
        );

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }

    #[test]
    fn migration_helper_keeps_source_message() {
        let e = Error::migration(3, "no such table: users");
        assert_eq!(e.to_string(), "migration 3 failed: no such table: users");
    }
}
