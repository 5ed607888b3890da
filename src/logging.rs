//! Log output setup
//!
//! The library only emits `tracing` events. Applications that want them on
//! stderr call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::config::MonitoringConfig;

/// Install a formatted subscriber filtered by `RUST_LOG`, or by
/// `config.log_level` when `RUST_LOG` is unset or invalid
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(config: &MonitoringConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}
