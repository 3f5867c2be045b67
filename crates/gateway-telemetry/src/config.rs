//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name recorded on the startup line
    pub service_name: String,

    /// Filter directives (`info`, `kube_gateway=debug,info`, ...)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "kube-nats".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SERVICE_NAME`: Service name (default: kube-nats)
    /// - `LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `LOG_JSON`: JSON logs (default: false, true inside Kubernetes)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let in_kubernetes = lookup("KUBERNETES_SERVICE_HOST").is_some();
        let defaults = Self::default();

        Self {
            service_name: lookup("SERVICE_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.service_name),

            log_level: lookup("LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_level),

            json_logs: lookup("LOG_JSON")
                .map(|v| {
                    let v = v.to_lowercase();
                    v == "true" || v == "1"
                })
                .unwrap_or(in_kubernetes),
        }
    }
}
