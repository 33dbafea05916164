//! Error types for configuration and unit parsing.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid size format: {0:?} (expected <number>[K|M|G|T|P|E][i])")]
    InvalidSizeFormat(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
