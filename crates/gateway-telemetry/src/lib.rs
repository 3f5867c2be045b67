//! # Gateway Telemetry
//!
//! Structured log setup for the gateway binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! Library crates never touch the global subscriber; they log through the
//! `tracing::Span` they are constructed with. Only the binary calls
//! [`init_telemetry`].
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LOG_LEVEL` / `RUST_LOG` | `info` | Filter directives |
//! | `LOG_JSON` | `false`, `true` in Kubernetes | One JSON object per line |
//! | `SERVICE_NAME` | `kube-nats` | Recorded on the startup line |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {directives:?}: {reason}")]
    Filter { directives: String, reason: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global subscriber described by `config`.
///
/// Hold the returned guard for the life of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(config)?;
    tracing::info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
    })
}

/// Marks telemetry as active; logs a final line when dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TelemetryError::Filter {
            directives: "[".into(),
            reason: "bad".into(),
        };
        assert!(err.to_string().contains("\"[\""));
    }
}
