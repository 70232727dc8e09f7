//! Tracing subscriber setup for the worker daemon.
//!
//! Library code logs through `log` and opens `tracing` spans; both end up in
//! the same subscriber once `init` has run.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] tracing_log::log_tracer::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// `RUST_LOG` wins; otherwise the configured level, falling back to `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Call once, before any worker starts.
pub fn init(config: &LoggingConfig) -> Result<(), TelemetryError> {
    tracing_log::LogTracer::init()?;

    let filter = env_filter(&config.level);
    if config.json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true));
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false));
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
