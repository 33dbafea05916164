//! Storage-capacity monitor for the Theia flow store.
//!
//! Samples disk usage every poll interval and, once free space falls below
//! the configured threshold, deletes the oldest rows from the base flow
//! table and each derived view using one cutoff per round.

pub mod cutoff;
pub mod monitor;

pub use cutoff::{RetentionCutoff, deletion_offset, resolve_cutoff};
pub use monitor::{EvictionReport, MonitorState, RoundOutcome, StorageMonitor, eviction_warranted};
