//! Logging initialization.

use melonconf::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a fmt subscriber filtered by the configured level.
///
/// `log_level` already carries `RUST_LOG` when it was set at load time; the
/// raw variable is only consulted if the configured directive is invalid.
///
/// Returns false if a global subscriber was already installed, which
/// leaves the existing one in place.
pub fn init(config: &TelemetryConfig) -> bool {
    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

fn build_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
