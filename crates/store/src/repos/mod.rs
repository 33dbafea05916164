//! Repository traits for store operations.

pub mod retention;
pub mod schema;

pub use retention::{DiskUsage, RetentionRepo};
pub use schema::{SchemaRepo, VERSION_TABLE};
