//! Logging initialization
//!
//! Builds a `tracing` subscriber with an `EnvFilter` (honoring `RUST_LOG`,
//! falling back to the configured filter) and either a human-readable or a
//! JSON formatting layer. The binary installs it globally; tests scope it.

use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Build the filter: `RUST_LOG` if set, otherwise the configured directive
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            Error::config(format!("invalid log filter {:?}: {}", config.filter, e))
        }),
    }
}

/// Subscriber for `config` without installing it
pub fn subscriber(config: &LoggingConfig) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    Ok(match config.format {
        LogFormat::Text => {
            Box::new(registry.with(tracing_subscriber::fmt::layer().with_target(false)))
        }
        LogFormat::Json => Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            ),
        ),
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(config)?).map_err(|e| {
        Error::internal_with_context("telemetry", format!("failed to install subscriber: {}", e))
    })
}
