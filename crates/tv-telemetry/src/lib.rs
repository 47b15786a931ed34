//! # Travis Telemetry
//!
//! Structured logging for the Travis application.
//!
//! ```rust,ignore
//! use tv_telemetry::{init_tracing, TelemetryConfig};
//!
//! init_tracing(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | - | Full filter directive, wins over `TV_LOG_LEVEL` |
//! | `TV_LOG_LEVEL` | `info` | Log level filter |
//! | `TV_JSON_LOGS` | `false` | JSON lines instead of compact output |
//! | `TV_LOG_LOCATION` | `false` | File and line of each event |
//! | `TV_SERVICE_NAME` | `travis` | Service name in the startup line |

mod config;
mod tracing_setup;

pub use config::{LogFormat, TelemetryConfig};
pub use tracing_setup::{env_filter, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install the tracing subscriber: {0}")]
    Init(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
