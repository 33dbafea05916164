//! Store error types.

use std::time::Duration;
use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Exception reported by the ClickHouse server.
    #[error("clickhouse exception: {0}")]
    Exception(String),

    /// The request never produced a server response.
    #[error("transport error: {0}")]
    Transport(String),

    /// A referenced table does not exist (ClickHouse code 60).
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("no rows returned: {0}")]
    RowNotFound(String),

    #[error("failed to connect to ClickHouse after {timeout:?}")]
    ConnectionTimeout {
        timeout: Duration,
        #[source]
        last: Box<StoreError>,
    },

    #[error("{operation} failed after {timeout:?}")]
    MetadataQueryFailure {
        operation: String,
        timeout: Duration,
        #[source]
        last: Box<StoreError>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether the error reports a missing table.
    pub fn is_unknown_table(&self) -> bool {
        matches!(self, StoreError::UnknownTable(_))
    }
}

/// Match the server message for a missing table or database.
pub(crate) fn is_unknown_table_message(message: &str) -> bool {
    message.contains("UNKNOWN_TABLE")
        || message.contains("Code: 60.")
        || message.contains("doesn't exist")
}

impl From<clickhouse::error::Error> for StoreError {
    fn from(err: clickhouse::error::Error) -> Self {
        match err {
            clickhouse::error::Error::BadResponse(message) => {
                if is_unknown_table_message(&message) {
                    StoreError::UnknownTable(message)
                } else {
                    StoreError::Exception(message)
                }
            }
            clickhouse::error::Error::RowNotFound => {
                StoreError::RowNotFound("query returned no rows".to_string())
            }
            other => StoreError::Transport(other.to_string()),
        }
    }
}
