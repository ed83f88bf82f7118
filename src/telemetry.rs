//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

/// Install the process-wide `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Safe to call more
/// than once; later calls are no-ops.
pub fn init(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
