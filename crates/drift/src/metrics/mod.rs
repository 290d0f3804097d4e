//! Metrics for drift load sessions.
//!
//! Events are emitted with `drift_core::emit!`.

pub mod events;

pub use events::*;
