//! Common test utilities: an in-memory store that records every statement.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use theia_core::{ByteSize, RetentionConfig};
use theia_store::{DiskUsage, RetentionRepo, StoreError, StoreResult, format_cutoff};
use time::{Duration, OffsetDateTime};
use time::macros::datetime;

/// Insertion time of the oldest row in fixtures.
pub const BASE_TIME: OffsetDateTime = datetime!(2022-06-01 00:00:00 UTC);

/// Monitor configuration used by the scenarios: 10 bytes allocated, 0.5/0.5.
pub fn scenario_config() -> RetentionConfig {
    RetentionConfig {
        allocated_space: ByteSize::new(10),
        threshold: 0.5,
        delete_percentage: 0.5,
        ..Default::default()
    }
}

/// `count` rows inserted one second apart starting at `BASE_TIME`.
pub fn rows_one_second_apart(count: i64) -> Vec<OffsetDateTime> {
    (0..count).map(|i| BASE_TIME + Duration::seconds(i)).collect()
}

/// Retention store backed by fixed answers.
///
/// Each call is logged as the SQL the ClickHouse store would send.
pub struct RecordingStore {
    statements: Mutex<Vec<String>>,
    disk: Option<DiskUsage>,
    parts_size: Option<u64>,
    row_count: Option<u64>,
    insertion_times: Vec<OffsetDateTime>,
    failing_deletes: HashSet<String>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new(free_space: u64, total_space: u64) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            disk: Some(DiskUsage {
                free_space,
                total_space,
            }),
            parts_size: Some(5),
            row_count: None,
            insertion_times: Vec::new(),
            failing_deletes: HashSet::new(),
        }
    }

    /// Base table rows, ordered by insertion time.
    pub fn with_rows(mut self, insertion_times: Vec<OffsetDateTime>) -> Self {
        self.insertion_times = insertion_times;
        self
    }

    /// Report a row count that differs from the stored rows.
    pub fn with_row_count(mut self, count: u64) -> Self {
        self.row_count = Some(count);
        self
    }

    pub fn without_disk_usage(mut self) -> Self {
        self.disk = None;
        self
    }

    pub fn without_parts_size(mut self) -> Self {
        self.parts_size = None;
        self
    }

    pub fn failing_delete(mut self, table: &str) -> Self {
        self.failing_deletes.insert(table.to_string());
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with("ALTER TABLE"))
            .collect()
    }

    fn record(&self, sql: String) {
        self.statements.lock().unwrap().push(sql);
    }
}

#[async_trait]
impl RetentionRepo for RecordingStore {
    async fn disk_usage(&self) -> StoreResult<DiskUsage> {
        self.record("SELECT free_space, total_space FROM system.disks".to_string());
        self.disk
            .ok_or_else(|| StoreError::Exception("Code: 241. Memory limit exceeded".to_string()))
    }

    async fn parts_size(&self) -> StoreResult<u64> {
        self.record("SELECT SUM(bytes) FROM system.parts".to_string());
        self.parts_size
            .ok_or_else(|| StoreError::Transport("connection reset".to_string()))
    }

    async fn row_count(&self, table: &str) -> StoreResult<u64> {
        self.record(format!("SELECT COUNT() FROM {table}"));
        Ok(self
            .row_count
            .unwrap_or(self.insertion_times.len() as u64))
    }

    async fn insertion_time_at(
        &self,
        table: &str,
        column: &str,
        offset: u64,
    ) -> StoreResult<Option<OffsetDateTime>> {
        self.record(format!("SELECT {column} FROM {table} LIMIT 1 OFFSET {offset}"));
        Ok(self.insertion_times.get(offset as usize).copied())
    }

    async fn delete_older_than(
        &self,
        table: &str,
        column: &str,
        cutoff: OffsetDateTime,
    ) -> StoreResult<()> {
        self.record(format!(
            "ALTER TABLE {table} DELETE WHERE {column} < toDateTime('{}')",
            format_cutoff(cutoff)?
        ));
        if self.failing_deletes.contains(table) {
            return Err(StoreError::Exception(format!(
                "Code: 341. Mutation on {table} was killed"
            )));
        }
        Ok(())
    }
}
