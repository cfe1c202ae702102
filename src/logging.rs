//! Logging setup
//!
//! Installs a `tracing` subscriber with two layers:
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else the configured level)
//!   └── Fmt Layer (stderr, plain or JSON lines)
//! ```
//!
//! Output goes to stderr so command results on stdout stay machine-readable.

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Logging errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the level filter
///
/// `RUST_LOG` wins when set and valid; otherwise `config.level` is used.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|_| LoggingError::InvalidFilter(config.level.clone()))
}

/// Install the global subscriber
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_filter(config)?;

    let result = if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true);
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(env_filter).with(fmt_layer),
        )
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true);
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(env_filter).with(fmt_layer),
        )
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
