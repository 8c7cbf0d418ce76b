//! Structured logging setup for embedders of the engine.

use tracing_subscriber::EnvFilter;

fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Initialize structured logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the provided level.
///
/// # Panics
///
/// Panics if a global subscriber is already installed; use [`try_init`] when
/// that is possible.
pub fn init(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(log_level))
        .with_target(false)
        .init();
}

/// Like [`init`], but returns `false` instead of panicking when a subscriber
/// is already installed.
pub fn try_init(log_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(log_level))
        .with_target(false)
        .try_init()
        .is_ok()
}
