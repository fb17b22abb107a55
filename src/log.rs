//! Module that contains the logging helpers used across the crate.
//!
//! Messages are plain text; the subscriber does the coloring.

use tracing_subscriber::EnvFilter;

/// Function that installs the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // a subscriber may already be installed by another test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn debug(msg: &str) {
    tracing::debug!("{msg}");
}

pub fn info(msg: &str) {
    tracing::info!("{msg}");
}

pub fn warn(msg: &str) {
    tracing::warn!("{msg}");
}

pub fn error(msg: &str) {
    tracing::error!("{msg}");
}
