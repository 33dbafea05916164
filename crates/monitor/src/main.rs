//! ClickHouse storage monitor binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use theia_core::config::{self, MONITOR_ENV_KEYS, MonitorSettings};
use theia_core::RetryPolicy;
use theia_monitor::StorageMonitor;
use theia_store::RetentionRepo;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Deletes the oldest flow records when ClickHouse runs low on disk space
#[derive(Parser, Debug)]
#[command(name = "clickhouse-monitor")]
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

    tracing::info!("Theia ClickHouse monitor v{}", env!("CARGO_PKG_VERSION"));

    let settings: MonitorSettings = config::load(args.config.as_deref(), MONITOR_ENV_KEYS)
        .context("failed to load configuration")?;
    settings
        .validate()
        .context("invalid monitor configuration")?;

    let store = theia_store::connect(&settings.clickhouse, &RetryPolicy::CONNECTION)
        .await
        .context("error when connecting to ClickHouse")?;
    let store: Arc<dyn RetentionRepo> = store;

    StorageMonitor::new(store, settings.retention).run().await;
    Ok(())
}
