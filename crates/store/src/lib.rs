//! Flow store access for the Theia ClickHouse plugins.
//!
//! This crate provides:
//! - Repository traits for retention and schema-version queries
//! - The ClickHouse implementation of those traits
//! - Connection establishment and metadata access with bounded retry

pub mod clickhouse;
pub mod error;
pub mod repos;
pub mod store;

pub use crate::clickhouse::{ClickHouseStore, format_cutoff};
pub use error::{StoreError, StoreResult};
pub use repos::{DiskUsage, RetentionRepo, SchemaRepo, VERSION_TABLE};
pub use store::FlowStore;

use std::future::Future;
use std::sync::Arc;
use theia_core::{ClickHouseConfig, RetryPolicy};

/// Open a ClickHouse store and wait until it answers a ping.
///
/// Pings every `policy.interval` until `policy.timeout` elapses, logging
/// each failed attempt.
pub async fn connect(
    config: &ClickHouseConfig,
    policy: &RetryPolicy,
) -> StoreResult<Arc<dyn FlowStore>> {
    config
        .validate()
        .map_err(|e| StoreError::Config(e.to_string()))?;
    let store = ClickHouseStore::new(config);
    wait_until_reachable(&store, policy).await?;
    tracing::info!(url = %config.url, "Connected to ClickHouse");
    Ok(Arc::new(store))
}

/// Ping `store` until it answers or `policy` is exhausted.
pub async fn wait_until_reachable(store: &dyn FlowStore, policy: &RetryPolicy) -> StoreResult<()> {
    policy
        .run("ping ClickHouse", || async move {
            store.ping().await.inspect_err(|err| match err {
                StoreError::Exception(message) => {
                    tracing::error!(message = %message, "Failed to ping ClickHouse");
                }
                other => tracing::error!(error = %other, "Failed to ping ClickHouse"),
            })
        })
        .await
        .map_err(|exhausted| StoreError::ConnectionTimeout {
            timeout: policy.timeout,
            last: Box::new(exhausted.last),
        })
}

/// Run a metadata query under `policy`, mapping exhaustion to `MetadataQueryFailure`.
pub async fn retry_metadata<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    query: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    policy
        .run(operation, query)
        .await
        .map_err(|exhausted| StoreError::MetadataQueryFailure {
            operation: operation.to_string(),
            timeout: policy.timeout,
            last: Box::new(exhausted.last),
        })
}
