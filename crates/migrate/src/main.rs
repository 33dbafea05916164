//! ClickHouse data-schema migration binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use theia_core::RetryPolicy;
use theia_core::config::{self, MIGRATION_ENV_KEYS, MigrationSettings};
use theia_migrate::VersionChain;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Migrates the flow store's data schema to the running Theia version
#[derive(Parser, Debug)]
#[command(name = "clickhouse-migrate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to an optional configuration file; environment variables override it
    #[arg(short, long, env = "THEIA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Theia ClickHouse migration v{}", env!("CARGO_PKG_VERSION"));

    let chain = VersionChain::builtin().context("invalid migrator chain")?;

    let settings: MigrationSettings = config::load(args.config.as_deref(), MIGRATION_ENV_KEYS)
        .context("failed to load configuration")?;
    settings
        .validate()
        .context("invalid migration configuration")?;

    let store = theia_store::connect(&settings.clickhouse, &RetryPolicy::CONNECTION)
        .await
        .context("error when connecting to ClickHouse")?;

    let report = theia_migrate::run(
        store.as_ref(),
        &chain,
        &settings.target_version,
        &settings.table_name,
        &RetryPolicy::METADATA_QUERY,
    )
    .await
    .context("data schema migration failed")?;

    if let Some(report) = report {
        tracing::info!(
            from = %report.from,
            to = %report.to,
            direction = ?report.direction,
            steps = report.steps_applied,
            "Data schema migration finished"
        );
    }
    Ok(())
}
