//! Drift: bulk-load staging for a cloud data warehouse.
//!
//! This crate handles:
//! - Encoding typed rows into delimited records or JSON documents
//! - Writing gzip files with row-count rotation
//! - Resolving the target schema and the field mapping
//! - Building PUT and `COPY INTO` statements
//! - Orchestrating upload, load, commit and cleanup for one session

pub mod cli;
pub mod config;
pub mod copy;
pub mod encoder;
pub mod error;
pub mod loader;
pub mod mapping;
pub mod metrics;
pub mod schema;
pub mod sink;
pub mod source;
pub mod warehouse;

// Re-export commonly used items
pub use cli::CliArgs;
pub use config::LoaderConfig;
pub use error::LoadError;
pub use loader::{BulkLoader, LoadOutcome, LoadState};
pub use source::{NdjsonSource, Row, RowSource, Value};
pub use warehouse::{ResultRow, SqlScriptConnection, WarehouseConnection};

// Re-export from drift-core
pub use drift_core::init_tracing;
