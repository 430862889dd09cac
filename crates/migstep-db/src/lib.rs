pub mod directory;
pub mod migrations;
pub mod sqlite;
pub mod validation;

pub use directory::DirectoryLoader;
pub use migrations::SqlMigration;
pub use sqlite::SqliteProcessor;
pub use validation::IdentifierValidator;
