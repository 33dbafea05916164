//! Combined store trait.

use crate::error::StoreResult;
use crate::repos::{RetentionRepo, SchemaRepo};
use async_trait::async_trait;

/// Everything the plugins need from the flow store.
#[async_trait]
pub trait FlowStore: RetentionRepo + SchemaRepo + Send + Sync {
    /// Check connectivity with a trivial query.
    async fn ping(&self) -> StoreResult<()>;
}
