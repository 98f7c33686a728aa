//! Tracing setup for host processes.

use tracing_subscriber::EnvFilter;

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a fmt subscriber filtered by `RUST_LOG`, or `default_directive`
/// when unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_directive))
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Like [`init_tracing`], but emits one JSON object per event.
pub fn init_json_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_directive))
        .with_current_span(false)
        .try_init()
        .is_ok()
}
