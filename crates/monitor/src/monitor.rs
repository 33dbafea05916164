//! Polling loop that keeps the flow store within its allocated space.

use crate::cutoff::{RetentionCutoff, resolve_cutoff};
use std::sync::Arc;
use theia_core::RetentionConfig;
use theia_store::{DiskUsage, RetentionRepo, StoreError};
use time::OffsetDateTime;

/// Whether free space has dropped below `threshold * allocated_space`.
pub fn eviction_warranted(free_space: u64, allocated_space: u64, threshold: f64) -> bool {
    (free_space as f64) < threshold * allocated_space as f64
}

/// What the next round will do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// Sample disk usage and evict if needed.
    Sampling,
    /// Skip this many more rounds without touching the store.
    Idle(u32),
}

/// Result of one eviction round.
#[derive(Debug)]
pub struct EvictionReport {
    /// Cutoff shared by every delete in the round.
    pub cutoff: RetentionCutoff,
    /// Tables whose delete was accepted, in the order issued.
    pub pruned: Vec<String>,
    /// Tables whose delete failed.
    pub failed: Vec<(String, StoreError)>,
}

impl EvictionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What happened in a single round.
#[derive(Debug)]
pub enum RoundOutcome {
    /// Idle round; the store was not queried.
    Skipped { remaining: u32 },
    /// The disk sample could not be read.
    SampleFailed(StoreError),
    /// Enough free space left.
    NoActionNeeded(DiskUsage),
    /// Eviction was warranted but the cutoff query failed.
    CutoffFailed(StoreError),
    /// Eviction was warranted but there is not a whole row to delete.
    NothingToDelete,
    /// Deletes were issued for every table.
    Evicted(EvictionReport),
}

/// Storage monitor state machine.
pub struct StorageMonitor {
    store: Arc<dyn RetentionRepo>,
    config: RetentionConfig,
    state: MonitorState,
}

impl StorageMonitor {
    pub fn new(store: Arc<dyn RetentionRepo>, config: RetentionConfig) -> Self {
        Self {
            store,
            config,
            state: MonitorState::Sampling,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run rounds forever, sleeping `poll_interval` between them.
    pub async fn run(mut self) {
        tracing::info!(
            table = %self.config.table_name,
            views = ?self.config.view_names,
            allocated_space = self.config.allocated_space.as_u64(),
            threshold = self.config.threshold,
            delete_percentage = self.config.delete_percentage,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            idle_rounds = self.config.idle_rounds_to_skip,
            "Storage monitor started"
        );
        loop {
            self.run_round().await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Execute one round and advance the state.
    pub async fn run_round(&mut self) -> RoundOutcome {
        match self.state {
            MonitorState::Idle(rounds) => {
                let remaining = rounds.saturating_sub(1);
                tracing::info!(remaining, "Skipping round after eviction");
                self.state = if remaining == 0 {
                    MonitorState::Sampling
                } else {
                    MonitorState::Idle(remaining)
                };
                RoundOutcome::Skipped { remaining }
            }
            MonitorState::Sampling => self.sample_and_evict().await,
        }
    }

    async fn sample_and_evict(&mut self) -> RoundOutcome {
        let usage = match self.store.disk_usage().await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::error!(error = %e, "Failed to get disk usage, skipping round");
                return RoundOutcome::SampleFailed(e);
            }
        };

        match self.store.parts_size().await {
            Ok(parts_size) => tracing::info!(
                free_space = usage.free_space,
                total_space = usage.total_space,
                parts_size,
                "Sampled disk usage"
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get size of data parts");
                tracing::info!(
                    free_space = usage.free_space,
                    total_space = usage.total_space,
                    "Sampled disk usage"
                );
            }
        }

        let allocated_space = self.config.allocated_space.as_u64();
        if !eviction_warranted(usage.free_space, allocated_space, self.config.threshold) {
            tracing::info!(
                free_space = usage.free_space,
                allocated_space,
                threshold = self.config.threshold,
                "Free space above threshold, no eviction needed"
            );
            return RoundOutcome::NoActionNeeded(usage);
        }

        let cutoff = match resolve_cutoff(
            self.store.as_ref(),
            &self.config.table_name,
            &self.config.insertion_time_column,
            self.config.delete_percentage,
        )
        .await
        {
            Ok(Some(cutoff)) => cutoff,
            Ok(None) => {
                tracing::info!(table = %self.config.table_name, "No rows old enough to evict");
                return RoundOutcome::NothingToDelete;
            }
            Err(e) => {
                tracing::error!(
                    table = %self.config.table_name,
                    error = %e,
                    "Failed to resolve retention cutoff"
                );
                return RoundOutcome::CutoffFailed(e);
            }
        };

        let report = self.evict(cutoff).await;
        self.state = match self.config.idle_rounds_to_skip {
            0 => MonitorState::Sampling,
            rounds => MonitorState::Idle(rounds),
        };
        RoundOutcome::Evicted(report)
    }

    async fn evict(&self, cutoff: RetentionCutoff) -> EvictionReport {
        tracing::info!(
            cutoff = %cutoff.cutoff,
            row_count = cutoff.row_count,
            offset = cutoff.offset,
            "Evicting rows older than cutoff"
        );

        let mut report = EvictionReport {
            cutoff,
            pruned: Vec::new(),
            failed: Vec::new(),
        };
        for table in self.config.tables() {
            match self.delete_from(table, cutoff.cutoff).await {
                Ok(()) => report.pruned.push(table.to_string()),
                Err(e) => {
                    tracing::error!(table = %table, cutoff = %cutoff.cutoff, error = %e, "Failed to delete old rows");
                    report.failed.push((table.to_string(), e));
                }
            }
        }

        tracing::info!(
            pruned = report.pruned.len(),
            failed = report.failed.len(),
            "Eviction round finished"
        );
        report
    }

    async fn delete_from(&self, table: &str, cutoff: OffsetDateTime) -> Result<(), StoreError> {
        self.store
            .delete_older_than(table, &self.config.insertion_time_column, cutoff)
            .await
    }
}
