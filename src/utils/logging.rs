//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber described by [`LoggingConfig`]. The
//! `RUST_LOG` environment variable takes precedence over the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Writer for the configured outputs. Console and file together tee every line.
fn make_writer(config: &LoggingConfig) -> Result<BoxMakeWriter> {
    let file = match (config.log_to_file, config.log_file_path.as_deref()) {
        (true, Some(path)) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?,
        ),
        (true, None) => {
            return Err(ProtocolError::ConfigError(
                "log_file_path must be specified when log_to_file is true".to_string(),
            ))
        }
        (false, _) => None,
    };

    Ok(match (config.log_to_console, file) {
        (true, Some(file)) => BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file))),
        (false, Some(file)) => BoxMakeWriter::new(Mutex::new(file)),
        (true, None) => BoxMakeWriter::new(std::io::stdout),
        (false, None) => BoxMakeWriter::new(std::io::sink),
    })
}

/// Install the global subscriber.
///
/// Fails when a subscriber is already installed; callers that may initialise
/// twice (tests, embedding applications) can ignore that error.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_ascii_lowercase()));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(config.log_to_console && !config.log_to_file)
        .with_writer(make_writer(config)?);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| ProtocolError::Custom(format!("Failed to install subscriber: {e}")))?;
    tracing::info!(app = %config.app_name, level = %config.log_level, "logging initialised");
    Ok(())
}
