//! Resolution of the data-schema version stored in ClickHouse.

use crate::chain::VersionChain;
use crate::error::{MigrateError, MigrateResult};
use theia_core::RetryPolicy;
use theia_store::{SchemaRepo, StoreError, retry_metadata};

/// Schema version of the data currently in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataVersion {
    /// Read from the version table.
    Recorded(String),
    /// No version recorded but flow data exists; it predates versioning.
    Legacy(String),
    /// Neither a version nor any flow data.
    Absent,
}

impl DataVersion {
    pub fn version(&self) -> Option<&str> {
        match self {
            DataVersion::Recorded(version) | DataVersion::Legacy(version) => Some(version),
            DataVersion::Absent => None,
        }
    }
}

/// Determine the version of the stored data.
///
/// A missing or empty version table falls back to probing `base_table`:
/// if it exists the data is assumed to be at the chain's earliest version.
pub async fn resolve_data_version(
    store: &dyn SchemaRepo,
    chain: &VersionChain,
    base_table: &str,
    policy: &RetryPolicy,
) -> MigrateResult<DataVersion> {
    let recorded = retry_metadata(policy, "read data schema version", || async move {
        match store.data_version().await {
            Ok(version) => Ok(version),
            Err(StoreError::UnknownTable(_)) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await?;

    if let Some(version) = recorded {
        if !chain.contains(&version) {
            return Err(MigrateError::UnrecognizedVersion {
                kind: "data schema",
                version,
            });
        }
        return Ok(DataVersion::Recorded(version));
    }

    let has_flows = retry_metadata(policy, "check for unversioned flow data", || {
        store.table_exists(base_table)
    })
    .await?;

    if has_flows {
        tracing::info!(
            table = %base_table,
            data_version = %chain.earliest(),
            "No version recorded, assuming data predates versioning"
        );
        Ok(DataVersion::Legacy(chain.earliest().to_string()))
    } else {
        Ok(DataVersion::Absent)
    }
}
