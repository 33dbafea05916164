//! Schema repository: the persisted data-schema version.

use crate::error::StoreResult;
use async_trait::async_trait;

/// Table holding the current data-schema version.
pub const VERSION_TABLE: &str = "migrate_version";

/// Repository for the migrator's metadata access.
#[async_trait]
pub trait SchemaRepo: Send + Sync {
    /// Read the recorded version.
    ///
    /// Fails with `UnknownTable` when the version table has never been
    /// created, and returns `None` when it exists but is empty. When several
    /// distinct versions are recorded the first one read wins.
    async fn data_version(&self) -> StoreResult<Option<String>>;

    /// Replace the recorded version, creating the version table if needed.
    async fn set_data_version(&self, version: &str) -> StoreResult<()>;

    /// Whether `table` exists.
    async fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Execute a statement that returns no rows.
    async fn execute(&self, sql: &str) -> StoreResult<()>;
}
