//! Data-schema migration for the Theia flow store.
//!
//! Reads the schema version recorded in ClickHouse (inferring it for
//! data written before versions were recorded), walks the version chain to
//! the running release's version, and records the new version once every
//! step has succeeded.

pub mod chain;
pub mod error;
pub mod executor;
pub mod version;

pub use chain::{Direction, MigrationPlan, Migrator, NoopMigrator, SqlMigrator, VersionChain};
pub use error::{MigrateError, MigrateResult};
pub use executor::{MigrationReport, migrate, run};
pub use version::{DataVersion, resolve_data_version};
