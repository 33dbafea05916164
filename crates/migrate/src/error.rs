//! Migration error types.

use theia_store::StoreError;
use thiserror::Error;

/// Migration errors.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("cannot recognize the {kind} version {version:?}")]
    UnrecognizedVersion { kind: &'static str, version: String },

    #[error("{actual} {direction} migrators for {versions} versions, expected {expected}")]
    MigratorCountMismatch {
        direction: &'static str,
        actual: usize,
        expected: usize,
        versions: usize,
    },

    #[error("no schema versions defined")]
    EmptyVersionOrder,

    #[error("version {0:?} appears more than once in the version order")]
    DuplicateVersion(String),

    #[error("migration from {from} to {to} failed")]
    MigrationStep {
        from: String,
        to: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for migration operations.
pub type MigrateResult<T> = std::result::Result<T, MigrateError>;
