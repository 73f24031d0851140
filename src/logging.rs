//! Subscriber setup for the command-line tool.
//!
//! Logs go to stderr so that stdout carries only bytes read from the port.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(default_level: &str) -> Result<EnvFilter, ParseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), BoxError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level)?)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}
