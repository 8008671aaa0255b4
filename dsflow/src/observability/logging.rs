//! Structured logging setup.

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::DsflowError;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` wins, else the configured directive.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, DsflowError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| DsflowError::Logging(format!("invalid filter '{}': {e}", config.filter))),
    }
}

/// Installs the global `tracing` subscriber.
///
/// Fails instead of panicking when the filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DsflowError> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    result.map_err(|e| DsflowError::Logging(e.to_string()))?;

    tracing::debug!(format = ?config.format, "dsflow logging initialized");
    Ok(())
}
