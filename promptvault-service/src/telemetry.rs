//! Tracing subscriber initialization.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` (from
//! `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`]) and either a JSON or a
//! human-readable `fmt` layer.

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::DEFAULT_LOG_FILTER;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Telemetry errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Output format (`PROMPTVAULT_LOG_FORMAT`, default json)
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Service name attached to the startup event
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: std::env::var("PROMPTVAULT_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            service_name: std::env::var("PROMPTVAULT_SERVICE_NAME")
                .unwrap_or_else(|_| "promptvault".to_string()),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}
