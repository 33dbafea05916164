//! Applies the migrators between two versions and records the result.

use crate::chain::{Direction, VersionChain};
use crate::error::{MigrateError, MigrateResult};
use crate::version::{DataVersion, resolve_data_version};
use theia_core::RetryPolicy;
use theia_store::{SchemaRepo, retry_metadata};

/// Summary of a completed migration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: String,
    pub to: String,
    pub direction: Direction,
    pub steps_applied: usize,
}

/// Migrate stored data from `from` to `to`.
///
/// The version table is only written after every step succeeded, and only
/// when the version actually changes.
pub async fn migrate(
    store: &dyn SchemaRepo,
    chain: &VersionChain,
    from: &str,
    to: &str,
    policy: &RetryPolicy,
) -> MigrateResult<MigrationReport> {
    let plan = chain.plan(from, to)?;

    for step in &plan.steps {
        tracing::info!(from = %step.from, to = %step.to, "Applying migration step");
        step.migrator
            .apply(store)
            .await
            .map_err(|source| MigrateError::MigrationStep {
                from: step.from.to_string(),
                to: step.to.to_string(),
                source,
            })?;
    }

    match plan.direction {
        Direction::Unchanged => {
            tracing::info!(
                data_version = %from,
                "Data schema version matches the target, nothing to migrate"
            );
        }
        direction => {
            retry_metadata(policy, "update data schema version", || {
                store.set_data_version(to)
            })
            .await?;
            let finished = match direction {
                Direction::Upgrade => "Data schema upgrading finished",
                _ => "Data schema downgrading finished",
            };
            tracing::info!(from = %from, to = %to, steps = plan.steps.len(), "{finished}");
        }
    }

    Ok(MigrationReport {
        from: from.to_string(),
        to: to.to_string(),
        direction: plan.direction,
        steps_applied: plan.steps.len(),
    })
}

/// Bring the stored data to `target`, resolving its current version first.
///
/// Returns `None` when there is no data schema to migrate.
pub async fn run(
    store: &dyn SchemaRepo,
    chain: &VersionChain,
    target: &str,
    base_table: &str,
    policy: &RetryPolicy,
) -> MigrateResult<Option<MigrationReport>> {
    if !chain.contains(target) {
        return Err(MigrateError::UnrecognizedVersion {
            kind: "target",
            version: target.to_string(),
        });
    }

    let data_version = resolve_data_version(store, chain, base_table, policy).await?;
    let Some(from) = data_version.version() else {
        tracing::info!("No data schema exists, nothing to migrate");
        return Ok(None);
    };
    tracing::info!(data_version = %from, target_version = %target, "Resolved data schema version");

    migrate(store, chain, from, target, policy).await.map(Some)
}
