//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `level`. Returns `false` when a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_logging(level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}
