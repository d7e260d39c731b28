//! Tracing subscriber setup.

use crate::config::{ConfigError, LogFormat};
use crate::constants::{DEFAULT_LOG_FILTER, ENV_LOG_FILTER};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `CONCORD_LOG`, then `RUST_LOG`, then the built-in default.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG_FILTER)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free
/// for command output. Call once at startup.
pub fn init_tracing(format: LogFormat) -> Result<(), ConfigError> {
    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let pretty = (format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| ConfigError::Telemetry {
            reason: e.to_string(),
        })?;

    tracing::debug!(format = ?format, "Tracing initialized");
    Ok(())
}
