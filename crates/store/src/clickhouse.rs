//! ClickHouse-backed store over the HTTP interface.

use crate::error::{StoreError, StoreResult};
use crate::repos::{DiskUsage, RetentionRepo, SchemaRepo, VERSION_TABLE};
use crate::store::FlowStore;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::Deserialize;
use theia_core::ClickHouseConfig;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Row, Deserialize)]
struct DiskRow {
    free_space: u64,
    total_space: u64,
}

#[derive(Debug, Row, Deserialize)]
struct InsertionTimeRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    inserted_at: OffsetDateTime,
}

/// Render a cutoff the way `toDateTime` expects it: `YYYY-MM-DD hh:mm:ss` in UTC.
pub fn format_cutoff(cutoff: OffsetDateTime) -> StoreResult<String> {
    cutoff
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .map_err(|e| StoreError::Config(format!("cannot format cutoff {cutoff}: {e}")))
}

/// ClickHouse store.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
}

impl ClickHouseStore {
    /// Build a client for the configured endpoint. No request is made here.
    pub fn new(config: &ClickHouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_user(&config.username)
            .with_password(&config.password);
        if let Some(database) = &config.database {
            client = client.with_database(database);
        }
        Self { client }
    }
}

#[async_trait]
impl RetentionRepo for ClickHouseStore {
    async fn disk_usage(&self) -> StoreResult<DiskUsage> {
        let row = self
            .client
            .query("SELECT free_space, total_space FROM system.disks")
            .fetch_optional::<DiskRow>()
            .await?
            .ok_or_else(|| StoreError::RowNotFound("system.disks".to_string()))?;
        Ok(DiskUsage {
            free_space: row.free_space,
            total_space: row.total_space,
        })
    }

    async fn parts_size(&self) -> StoreResult<u64> {
        let size = self
            .client
            .query("SELECT SUM(bytes) FROM system.parts")
            .fetch_one::<u64>()
            .await?;
        Ok(size)
    }

    async fn row_count(&self, table: &str) -> StoreResult<u64> {
        let count = self
            .client
            .query(&format!("SELECT COUNT() FROM {table}"))
            .fetch_one::<u64>()
            .await?;
        Ok(count)
    }

    async fn insertion_time_at(
        &self,
        table: &str,
        column: &str,
        offset: u64,
    ) -> StoreResult<Option<OffsetDateTime>> {
        let row = self
            .client
            .query(&format!("SELECT {column} FROM {table} LIMIT 1 OFFSET {offset}"))
            .fetch_optional::<InsertionTimeRow>()
            .await?;
        Ok(row.map(|row| row.inserted_at))
    }

    async fn delete_older_than(
        &self,
        table: &str,
        column: &str,
        cutoff: OffsetDateTime,
    ) -> StoreResult<()> {
        let cutoff = format_cutoff(cutoff)?;
        self.client
            .query(&format!(
                "ALTER TABLE {table} DELETE WHERE {column} < toDateTime('{cutoff}')"
            ))
            .execute()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SchemaRepo for ClickHouseStore {
    async fn data_version(&self) -> StoreResult<Option<String>> {
        let rows = self
            .client
            .query(&format!("SELECT version FROM {VERSION_TABLE}"))
            .fetch_all::<String>()
            .await?;
        let mut versions: Vec<String> = Vec::with_capacity(rows.len());
        for version in rows {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
        if versions.len() > 1 {
            tracing::warn!(
                table = VERSION_TABLE,
                versions = ?versions,
                "Multiple data versions recorded, using the first"
            );
        }
        Ok(versions.into_iter().next())
    }

    async fn set_data_version(&self, version: &str) -> StoreResult<()> {
        self.client
            .query(&format!(
                "CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (version String) ENGINE = MergeTree ORDER BY tuple()"
            ))
            .execute()
            .await?;
        self.client
            .query(&format!("INSERT INTO {VERSION_TABLE} (*) VALUES (?)"))
            .bind(version)
            .execute()
            .await?;
        // Drop older rows only once the new one is in, so a failed insert
        // never leaves the table empty.
        self.client
            .clone()
            .with_option("mutations_sync", "1")
            .query(&format!("ALTER TABLE {VERSION_TABLE} DELETE WHERE version != ?"))
            .bind(version)
            .execute()
            .await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        match self.row_count(table).await {
            Ok(_) => Ok(true),
            Err(StoreError::UnknownTable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, sql: &str) -> StoreResult<()> {
        self.client.query(sql).execute().await?;
        Ok(())
    }
}

#[async_trait]
impl FlowStore for ClickHouseStore {
    async fn ping(&self) -> StoreResult<()> {
        self.client.query("SELECT 1").fetch_one::<u8>().await?;
        Ok(())
    }
}
