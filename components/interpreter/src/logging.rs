//! Logging bootstrap
//!
//! The runtime logs through `tracing` under the `rill::gc` and `rill::vm`
//! targets. Hosts that do not install their own subscriber can call
//! [`init_logging`].

use core_types::RuntimeConfig;
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` when the variable is unset or invalid.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// [`init_logging`] with the configured `log_level` as the fallback filter
pub fn init_from_config(config: &RuntimeConfig) -> bool {
    init_logging(&config.log_level)
}
