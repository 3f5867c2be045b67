//! # Store Client Configuration
//!
//! Either in-cluster (service account) or an explicit API server URL.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;

/// Service-account mount inside a pod.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Connection parameters for [`HttpResourceStore`](crate::HttpResourceStore).
#[derive(Clone)]
pub struct StoreConfig {
    /// API server base URL, e.g. `https://10.0.0.1:443`.
    pub api_url: String,
    /// Bearer token sent on every request.
    pub token: Option<String>,
    /// File the token was read from. Re-read when the server answers 401.
    pub token_file: Option<PathBuf>,
    /// Extra PEM root certificate(s) to trust.
    pub ca_pem: Option<Vec<u8>>,
    /// Accept any server certificate.
    pub insecure_skip_tls_verify: bool,
    /// TCP connect limit.
    pub connect_timeout: Duration,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl StoreConfig {
    /// Configuration for an explicit API server URL, no credentials.
    pub fn explicit(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
            token_file: None,
            ca_pem: None,
            insecure_skip_tls_verify: false,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Configuration from the pod's service account.
    pub fn in_cluster() -> Result<Self, StoreError> {
        Self::in_cluster_from(|key| std::env::var(key).ok(), Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// In-cluster configuration from an injectable environment and
    /// service-account directory.
    pub fn in_cluster_from(
        lookup: impl Fn(&str) -> Option<String>,
        service_account_dir: &Path,
    ) -> Result<Self, StoreError> {
        let host = lookup("KUBERNETES_SERVICE_HOST").filter(|v| !v.is_empty());
        let port = lookup("KUBERNETES_SERVICE_PORT").filter(|v| !v.is_empty());
        let (Some(host), Some(port)) = (host, port) else {
            return Err(StoreError::Config(
                "unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and \
                 KUBERNETES_SERVICE_PORT must be defined"
                    .into(),
            ));
        };

        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };
        let token_file = service_account_dir.join("token");
        let token = read_file(&token_file)?;
        let ca_pem = std::fs::read(service_account_dir.join("ca.crt")).map_err(|e| {
            StoreError::Config(format!("failed to read service account CA: {e}"))
        })?;

        Ok(Self {
            token: Some(token.trim().to_string()),
            token_file: Some(token_file),
            ca_pem: Some(ca_pem),
            ..Self::explicit(format!("https://{host}:{port}"))
        })
    }

    /// Fixed bearer token. Replaces any token file.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_file = None;
        self
    }

    /// Read the bearer token from a file. The file is read again whenever
    /// the server rejects the current token.
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        self.token = Some(read_token(&path)?);
        self.token_file = Some(path);
        Ok(self)
    }

    /// Trust the PEM certificate(s) in `path`.
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let pem = std::fs::read(&path).map_err(|e| {
            StoreError::Config(format!("failed to read CA file {}: {e}", path.display()))
        })?;
        self.ca_pem = Some(pem);
        Ok(self)
    }

    #[must_use]
    pub fn with_insecure_skip_tls_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_tls_verify = insecure;
        self
    }
}

/// Trimmed contents of a token file.
fn read_token(path: &Path) -> Result<String, StoreError> {
    Ok(read_file(path)?.trim().to_string())
}

fn read_file(path: &Path) -> Result<String, StoreError> {
    std::fs::read_to_string(path)
        .map_err(|e| StoreError::Config(format!("failed to read {}: {e}", path.display())))
}
