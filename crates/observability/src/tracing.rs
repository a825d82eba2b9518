//! Tracing/logging initialization.
//!
//! Services embedding the core call one of these once at startup; the
//! library crates only emit through `tracing` and never install a
//! subscriber themselves.

use tracing_subscriber::EnvFilter;

/// Initialize JSON logging for the process.
///
/// Filtering is configured via `RUST_LOG` (default `info`). Safe to call
/// multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_target(false)
        .try_init();
}

/// Human-readable variant for local development and tests.
pub fn init_compact() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(true)
        .try_init();
}
