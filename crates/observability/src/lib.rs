//! Tracing/logging setup shared by binaries and tests embedding the mapper.

/// Initialize process-wide observability with JSON logs filtered by `RUST_LOG`
/// (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::{ObservabilityConfig, init_with};
