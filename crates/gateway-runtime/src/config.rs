//! # Gateway Configuration
//!
//! Read once at startup from environment variables. Tests inject a lookup
//! function instead of touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use kube_gateway::{HandlerConfig, RestartPolicy};
use kube_store::{StoreConfig, StoreError};
use shared_bus::NatsOptions;
use shared_types::ClusterId;
use thiserror::Error;

pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_CLIENT_NAME: &str = "kube-nats";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CLUSTER must be set to the name of the cluster this gateway serves")]
    MissingCluster,

    #[error("invalid bus url {url:?}: {reason}")]
    InvalidBusUrl { url: String, reason: String },

    #[error("{var}={value:?} is not a valid {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var} must be greater than zero")]
    NonPositive { var: &'static str },

    #[error("WATCH_BACKOFF_INITIAL_MS ({initial:?}) exceeds WATCH_BACKOFF_MAX_MS ({max:?})")]
    BackoffOrder { initial: Duration, max: Duration },
}

/// How to reach the resource store.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    /// Explicit API server URL. `None` means in-cluster service account.
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("ca_file", &self.ca_file)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub cluster: ClusterId,
    pub nats_url: String,
    pub nats_client_name: String,
    pub publish_events: bool,
    pub store: StoreSettings,
    pub handler: HandlerConfig,
    pub restart: RestartPolicy,
}

impl GatewayConfig {
    /// Configuration with defaults for everything but the cluster.
    pub fn new(cluster: ClusterId) -> Self {
        Self {
            cluster,
            nats_url: DEFAULT_NATS_URL.to_string(),
            nats_client_name: DEFAULT_CLIENT_NAME.to_string(),
            publish_events: false,
            store: StoreSettings::default(),
            handler: HandlerConfig::default(),
            restart: RestartPolicy::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let cluster = get("CLUSTER").ok_or(ConfigError::MissingCluster)?;
        let mut config = Self::new(ClusterId::new(cluster));

        if let Some(url) = get("NATS_URL") {
            config.nats_url = url;
        }
        if let Some(name) = get("NATS_CLIENT_NAME") {
            config.nats_client_name = name;
        }

        // Unparseable values disable event publishing rather than failing startup.
        config.publish_events = get("PUBLISH_EVENTS")
            .map(|v| parse_bool(&v).unwrap_or(false))
            .unwrap_or(false);

        config.store = StoreSettings {
            api_url: get("KUBE_API_URL"),
            token: get("KUBE_TOKEN"),
            token_file: get("KUBE_TOKEN_FILE").map(PathBuf::from),
            ca_file: get("KUBE_CA_FILE").map(PathBuf::from),
            insecure_skip_tls_verify: bool_var(&get, "KUBE_INSECURE_SKIP_TLS_VERIFY", false)?,
        };

        if let Some(ms) = millis_var(&get, "STORE_TIMEOUT_MS")? {
            config.handler.store_timeout = ms;
        }
        if let Some(v) = get("HANDLER_MAX_IN_FLIGHT") {
            config.handler.max_in_flight = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: "HANDLER_MAX_IN_FLIGHT",
                value: v.clone(),
                expected: "integer",
            })?;
        }

        config.restart.enabled = bool_var(&get, "WATCH_RESTART", true)?;
        if let Some(ms) = millis_var(&get, "WATCH_BACKOFF_INITIAL_MS")? {
            config.restart.initial_backoff = ms;
        }
        if let Some(ms) = millis_var(&get, "WATCH_BACKOFF_MAX_MS")? {
            config.restart.max_backoff = ms;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.as_str().is_empty() {
            return Err(ConfigError::MissingCluster);
        }
        validate_bus_url(&self.nats_url)?;
        if self.handler.store_timeout.is_zero() {
            return Err(ConfigError::NonPositive { var: "STORE_TIMEOUT_MS" });
        }
        if self.handler.max_in_flight == 0 {
            return Err(ConfigError::NonPositive { var: "HANDLER_MAX_IN_FLIGHT" });
        }
        if self.restart.initial_backoff.is_zero() {
            return Err(ConfigError::NonPositive { var: "WATCH_BACKOFF_INITIAL_MS" });
        }
        if self.restart.initial_backoff > self.restart.max_backoff {
            return Err(ConfigError::BackoffOrder {
                initial: self.restart.initial_backoff,
                max: self.restart.max_backoff,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn nats_options(&self) -> NatsOptions {
        NatsOptions::new(self.nats_url.clone()).with_name(self.nats_client_name.clone())
    }

    /// Store client configuration. Reads token and CA files.
    pub fn store_config(&self) -> Result<StoreConfig, StoreError> {
        let settings = &self.store;
        let Some(url) = &settings.api_url else {
            return StoreConfig::in_cluster();
        };

        let mut config = StoreConfig::explicit(url.clone());
        if let Some(token) = &settings.token {
            config = config.with_token(token.clone());
        } else if let Some(path) = &settings.token_file {
            config = config.with_token_file(path.clone())?;
        }
        if let Some(path) = &settings.ca_file {
            config = config.with_ca_file(path.clone())?;
        }
        Ok(config.with_insecure_skip_tls_verify(settings.insecure_skip_tls_verify))
    }
}

/// `strconv.ParseBool` compatible.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn bool_var(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue {
            var,
            value: v,
            expected: "boolean",
        }),
    }
}

fn millis_var(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(v) = get(var) else {
        return Ok(None);
    };
    let ms: u64 = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: v.clone(),
        expected: "number of milliseconds",
    })?;
    Ok(Some(Duration::from_millis(ms)))
}

fn validate_bus_url(urls: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBusUrl {
        url: urls.to_string(),
        reason: reason.to_string(),
    };

    for url in urls.split(',').map(str::trim) {
        let rest = match url.split_once("://") {
            Some(("nats" | "tcp", rest)) => rest,
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme {scheme:?}"))),
            None => url,
        };
        let authority = rest.split('/').next().unwrap_or_default();
        let host_port = authority.rsplit('@').next().unwrap_or_default();
        if host_port.is_empty() || host_port.starts_with(':') {
            return Err(invalid("missing host"));
        }
        if let Some((host, port)) = host_port.rsplit_once(':') {
            // Bare IPv6 without brackets has no port to check.
            if !host.contains(':') || host.ends_with(']') {
                port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
            }
        }
    }
    Ok(())
}
