//! Retention cutoff resolution.

use theia_store::{RetentionRepo, StoreResult};
use time::OffsetDateTime;

/// Boundary of one eviction round.
///
/// Rows inserted strictly before `cutoff` are deleted from every table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionCutoff {
    pub row_count: u64,
    pub offset: u64,
    pub cutoff: OffsetDateTime,
}

/// Number of base-table rows to evict: `floor(row_count * delete_percentage)`.
///
/// Capped at `row_count - 1` so the boundary row always exists; the newest
/// row survives even when the whole table is due for eviction.
pub fn deletion_offset(row_count: u64, delete_percentage: f64) -> u64 {
    let offset = (row_count as f64 * delete_percentage).floor();
    if offset <= 0.0 {
        0
    } else {
        (offset as u64).min(row_count.saturating_sub(1))
    }
}

/// Find the insertion time separating evicted rows from retained ones in `table`.
///
/// Returns `None` when the fraction rounds down to zero rows, or when the
/// boundary row disappeared between counting and reading it.
pub async fn resolve_cutoff(
    repo: &dyn RetentionRepo,
    table: &str,
    column: &str,
    delete_percentage: f64,
) -> StoreResult<Option<RetentionCutoff>> {
    let row_count = repo.row_count(table).await?;
    let offset = deletion_offset(row_count, delete_percentage);
    if offset == 0 {
        tracing::debug!(table = %table, row_count, "Too few rows to evict");
        return Ok(None);
    }

    let Some(cutoff) = repo.insertion_time_at(table, column, offset).await? else {
        tracing::warn!(table = %table, row_count, offset, "Boundary row vanished before it could be read");
        return Ok(None);
    };

    Ok(Some(RetentionCutoff {
        row_count,
        offset,
        cutoff,
    }))
}
