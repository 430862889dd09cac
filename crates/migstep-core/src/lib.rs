pub mod loader;
pub mod memory;
pub mod migration;
pub mod processor;
pub mod registry;
pub mod report;
pub mod runner;
pub mod version;

pub use loader::{MigrationLoader, MigrationSet};
pub use memory::MemoryProcessor;
pub use migration::{
    ApplyReport, CapturedFailure, DefaultExecutor, Migration, MigrationContext, MigrationExecutor,
};
pub use processor::{Column, ColumnType, Processor, TableData, Value, check_row_shape};
pub use registry::{MigrationEntry, MigrationRegistry};
pub use report::{FailureLog, MigrationState, MigrationStatus, StepReport};
pub use runner::{MigrationRunner, RunnerOptions};
pub use version::{DEFAULT_VERSION_TABLE, VersionInfo, VersionStore, VersionTableMigration};

pub use migstep_common::{Direction, Error, Result};
