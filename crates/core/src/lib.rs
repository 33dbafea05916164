//! Shared building blocks for the Theia ClickHouse plugins.
//!
//! - Configuration types and the file/environment loader
//! - Size (`10Gi`) and duration (`1m`) parsing
//! - Deadline-bounded retry used for connecting and metadata queries

pub mod config;
pub mod duration;
pub mod error;
pub mod retry;
pub mod size;

pub use config::{ClickHouseConfig, MigrationSettings, MonitorSettings, RetentionConfig};
pub use duration::parse_duration;
pub use error::{Error, Result};
pub use retry::{RetryExhausted, RetryPolicy};
pub use size::{ByteSize, parse_size};
