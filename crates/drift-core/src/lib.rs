//! drift-core: Shared components for the drift bulk loader.
//!
//! - `config/` - Environment variable interpolation and YAML file loading
//! - `metrics/` - The `InternalEvent` trait and `emit!` macro
//! - `error` - Configuration error types
//! - `tracing` - Subscriber initialization for the CLI

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing;

// Re-export commonly used items
pub use config::{InterpolationResult, interpolate, is_yaml_file, parse_yaml, read_yaml_file};
pub use error::ConfigError;
pub use metrics::events::InternalEvent;
pub use self::tracing::init_tracing;
