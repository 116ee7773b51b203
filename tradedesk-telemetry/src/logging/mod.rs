//! Structured logging system for TradeDesk.
//!
//! Provides configurable logging with support for:
//! - JSON and pretty-print formats
//! - Multiple output targets (stdout, stderr, file)
//! - Log rotation
//! - `RUST_LOG` overrides

mod config;

pub use config::{LogConfig, LogFormat, LogOutput, RotationConfig};

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// File name prefix used by file outputs.
pub const LOG_FILE_NAME: &str = "tradedesk.log";

/// Initialize the logging system with the given configuration.
///
/// Returns guards that must be kept alive for the duration of the program
/// so buffered file output is flushed.
///
/// # Example
///
/// ```no_run
/// use tradedesk_telemetry::logging::{init_logging, LogConfig};
///
/// let config = LogConfig::default();
/// let _guards = init_logging(&config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    let env_filter = build_filter(&config.level)?;

    let mut guards = Vec::new();
    let mut layers = Vec::new();

    for output in &config.outputs {
        match output {
            LogOutput::Stdout => layers.push(console_layer(config, std::io::stdout)),
            LogOutput::Stderr => layers.push(console_layer(config, std::io::stderr)),
            LogOutput::File { path, rotation } => {
                let (layer, guard) = file_layer(config, Path::new(path), *rotation)?;
                layers.push(layer);
                guards.push(guard);
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guards)
}

/// Builds the level filter. `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| LoggingError::InvalidConfig(format!("bad level '{level}': {e}")))
}

fn console_layer<S, W>(config: &LogConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(config.include_thread_id)
        .with_file(config.include_file_info)
        .with_line_number(config.include_file_info);

    match config.format {
        LogFormat::Json => base.json().flatten_event(true).boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    }
}

fn file_layer<S>(
    config: &LogConfig,
    dir: &Path,
    rotation: Option<RotationConfig>,
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;

    let appender = match rotation.unwrap_or(RotationConfig::Daily) {
        RotationConfig::Hourly => tracing_appender::rolling::hourly(dir, LOG_FILE_NAME),
        RotationConfig::Daily => tracing_appender::rolling::daily(dir, LOG_FILE_NAME),
        RotationConfig::Never => tracing_appender::rolling::never(dir, LOG_FILE_NAME),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    // Files always get JSON so they can be shipped as-is.
    let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(config.include_thread_id)
        .with_file(config.include_file_info)
        .with_line_number(config.include_file_info)
        .json()
        .flatten_event(true)
        .boxed();

    Ok((layer, guard))
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create log directory
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),

    /// A global subscriber is already installed
    #[error("Logging is already initialized")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_rejects_garbage() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(build_filter("info").is_ok());
        assert!(build_filter("tradedesk_gateway=debug,warn").is_ok());
        assert!(matches!(
            build_filter("=[{bad"),
            Err(LoggingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_init_with_file_output_then_reinit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested");
        let config = LogConfig {
            outputs: vec![LogOutput::File {
                path: log_dir.to_string_lossy().into_owned(),
                rotation: Some(RotationConfig::Never),
            }],
            ..LogConfig::default()
        };

        let guards = init_logging(&config).unwrap();
        assert_eq!(guards.len(), 1);
        assert!(log_dir.is_dir());

        tracing::info!("written to file");
        drop(guards);
        assert!(log_dir.join(LOG_FILE_NAME).exists());

        assert!(matches!(
            init_logging(&LogConfig::default()),
            Err(LoggingError::AlreadyInitialized)
        ));
    }
}
