//! Global logging setup.
//!
//! Library code logs through `log` and `tracing`; this installs a single
//! `tracing-subscriber` stack and bridges `log` records into it.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Result, StowageError};

/// Builds the filter: `RUST_LOG` wins, then the configured level, then `info`.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let json_layer = config
        .json
        .then(|| fmt::layer().json().with_current_span(true).with_target(true));
    let text_layer = (!config.json).then(|| fmt::layer().with_target(true));

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(json_layer)
        .with(text_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| StowageError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| StowageError::Logging(e.to_string()))?;

    log::debug!("Logging initialized (level={}, json={})", config.level, config.json);
    Ok(())
}
