//! Telemetry configuration from environment variables.

use serde::Deserialize;
use std::env;

/// Output shape of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Configuration for the log subscriber.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every line.
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or full directive
    pub log_level: String,

    pub format: LogFormat,

    /// Include file and line of each event
    pub with_location: bool,

    /// ANSI colors in compact output
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "travis".to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Compact,
            with_location: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TV_SERVICE_NAME`: Service name (default: travis)
    /// - `TV_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `TV_JSON_LOGS`: JSON output (default: false, true in containers)
    /// - `TV_LOG_LOCATION`: Include file and line (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        let json = env::var("TV_JSON_LOGS")
            .map(|v| is_truthy(&v))
            .unwrap_or(is_container);

        Self {
            service_name: env::var("TV_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("TV_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            format: if json { LogFormat::Json } else { LogFormat::Compact },

            with_location: env::var("TV_LOG_LOCATION")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.with_location),

            ansi: !is_container,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
