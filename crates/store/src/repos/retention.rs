//! Retention repository: disk sampling and time-based eviction.

use crate::error::StoreResult;
use async_trait::async_trait;
use time::OffsetDateTime;

/// One sample of the store's disk status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub free_space: u64,
    pub total_space: u64,
}

/// Repository for the queries issued by the storage monitor.
#[async_trait]
pub trait RetentionRepo: Send + Sync {
    /// Free and total bytes of the first disk in `system.disks`.
    async fn disk_usage(&self) -> StoreResult<DiskUsage>;

    /// Total bytes of all data parts.
    async fn parts_size(&self) -> StoreResult<u64>;

    /// Number of rows in `table`.
    async fn row_count(&self, table: &str) -> StoreResult<u64>;

    /// Insertion time of the row at `offset`, or `None` past the end of the table.
    async fn insertion_time_at(
        &self,
        table: &str,
        column: &str,
        offset: u64,
    ) -> StoreResult<Option<OffsetDateTime>>;

    /// Delete every row of `table` whose `column` is strictly before `cutoff`.
    async fn delete_older_than(
        &self,
        table: &str,
        column: &str,
        cutoff: OffsetDateTime,
    ) -> StoreResult<()>;
}
