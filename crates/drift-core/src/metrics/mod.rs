//! Metrics infrastructure.
//!
//! Event types live next to the code that emits them; this module only
//! provides the `InternalEvent` trait and the `emit!` macro. No recorder is
//! installed here, so events are no-ops until the embedding application
//! installs one.

pub mod events;

/// Macro for emitting metric events (Vector-style pattern).
///
/// # Example
///
/// ```ignore
/// use drift_core::emit;
///
/// emit!(FileWritten { rows: 100, bytes: 4096, target: "public.orders".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        <_ as $crate::metrics::events::InternalEvent>::emit($event)
    };
}
