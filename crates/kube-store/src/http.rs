//! # HTTP Resource Store
//!
//! [`ResourceStore`] over the Kubernetes REST API.
//!
//! ```text
//!   core group   /api/v1[/namespaces/<ns>]/<resource>[/<name>[/<sub>...]]
//!   named group  /apis/<group>/<version>[/namespaces/<ns>]/<resource>[/<name>[/<sub>...]]
//! ```
//!
//! Every path segment is percent-encoded on its own, so a name can never
//! address a different resource. Empty, `.` and `..` segments are rejected.
//! Options become query parameters, except delete options which travel as
//! the request body. Watches use `?watch=true` and read the
//! newline-delimited JSON event stream on a background task.
//!
//! A token read from a file is re-read when the server answers 401, and
//! the request is retried once if the file now holds a different token.
//! Clones share the current token.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use shared_types::{Object, ObjectList, Options, ResourceDescriptor, WatchEvent};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::watch::{Watch, WatchSender};
use crate::{ResourceStore, DEFAULT_WATCH_CAPACITY};

/// Kubernetes API client.
#[derive(Clone)]
pub struct HttpResourceStore {
    client: reqwest::Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
    token_file: Option<Arc<PathBuf>>,
}

impl HttpResourceStore {
    /// Build the HTTP client from `config`.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout);
        if let Some(pem) = &config.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| StoreError::Config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if config.insecure_skip_tls_verify {
            warn!("TLS certificate verification disabled for the store");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let base_url = Url::parse(&config.api_url)
            .map_err(|e| StoreError::Config(format!("invalid API server URL {:?}: {e}", config.api_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "invalid API server URL {:?}: not a base URL",
                config.api_url
            )));
        }

        info!(api_url = %config.api_url, "Store client configured");
        Ok(Self {
            client,
            base_url,
            token: Arc::new(RwLock::new(config.token)),
            token_file: config.token_file.map(Arc::new),
        })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Full URL for a resource, object or subresource.
    fn url(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: Option<&str>,
        subresources: &[String],
    ) -> Result<Url, StoreError> {
        let mut segments = Vec::with_capacity(6 + subresources.len());
        if descriptor.is_core() {
            segments.push("api");
        } else {
            segments.push("apis");
            segments.push(path_segment("group", &descriptor.group)?);
        }
        segments.push(path_segment("version", &descriptor.version)?);
        if !namespace.is_empty() {
            segments.push("namespaces");
            segments.push(path_segment("namespace", namespace)?);
        }
        segments.push(path_segment("resource", &descriptor.resource)?);
        if let Some(name) = name {
            segments.push(path_segment("name", name)?);
        }
        for subresource in subresources {
            segments.push(path_segment("subresource", subresource)?);
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Config(format!("{} is not a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and check its status. `prepare` adds query and body,
    /// and runs again if the request is retried with a reloaded token.
    async fn send(
        &self,
        method: Method,
        url: Url,
        prepare: impl Fn(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, StoreError> {
        let sent = self.token.read().clone();
        let response = prepare(self.request(method.clone(), url.clone(), sent.as_deref()))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(token) = self.reload_token(sent.as_deref()).await {
                let response = prepare(self.request(method, url, Some(&token)))
                    .send()
                    .await
                    .map_err(unavailable)?;
                return check_status(response).await;
            }
        }
        check_status(response).await
    }

    /// Re-read the token file. Returns the new token when it differs from
    /// the one the server rejected.
    async fn reload_token(&self, rejected: Option<&str>) -> Option<String> {
        let path = self.token_file.as_ref()?;
        let token = match tokio::fs::read_to_string(path.as_path()).await {
            Ok(contents) => contents.trim().to_string(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to re-read store token");
                return None;
            }
        };
        if token.is_empty() || rejected == Some(token.as_str()) {
            debug!(path = %path.display(), "Store token unchanged after 401");
            return None;
        }
        *self.token.write() = Some(token.clone());
        info!(path = %path.display(), "Store token reloaded");
        Some(token)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        prepare: impl Fn(RequestBuilder) -> RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = self.send(method, url, prepare).await?;
        let body = response.bytes().await.map_err(unavailable)?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// One URL path segment. Encoding happens when it is pushed onto the URL.
fn path_segment<'a>(what: &str, value: &'a str) -> Result<&'a str, StoreError> {
    match value {
        "" => Err(StoreError::invalid(format!("{what} may not be empty"))),
        "." | ".." => Err(StoreError::invalid(format!("{what} may not be {value:?}"))),
        _ => Ok(value),
    }
}

fn unavailable(error: reqwest::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

/// Kubernetes `Status` document, as returned on failures.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Status {
    kind: String,
    message: String,
    reason: String,
    code: Option<u16>,
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn status_error(code: u16, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<Status>(body) {
        Ok(status) if status.kind == "Status" && !status.message.is_empty() => {
            StoreError::status(status.code.unwrap_or(code), status.reason, status.message)
        }
        _ => {
            let text = String::from_utf8_lossy(body);
            let message = if text.trim().is_empty() {
                format!("the server responded with status {code}")
            } else {
                format!("the server responded with status {code}: {}", text.trim())
            };
            StoreError::status(code, "Unknown", message)
        }
    }
}

/// Encode options as query parameters. Arrays repeat the key.
fn query_pairs(options: &Options) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in options {
        if key == "kind" || key == "apiVersion" {
            continue;
        }
        match value {
            Value::Null => {}
            Value::Array(values) => {
                for value in values {
                    if let Some(text) = scalar(value) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }
    pairs
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// `DeleteOptions` body with its type fields filled in.
fn delete_body(options: &Options) -> Options {
    let mut body = options.clone();
    body.entry("kind")
        .or_insert_with(|| Value::String("DeleteOptions".into()));
    body.entry("apiVersion")
        .or_insert_with(|| Value::String("v1".into()));
    body
}

/// Splits a byte stream into non-empty lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = line.trim_ascii();
            if !line.is_empty() {
                lines.push(line.to_vec());
            }
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim_ascii();
        (!rest.is_empty()).then(|| rest.to_vec())
    }
}

async fn forward_line(line: &[u8], sender: &WatchSender) -> Result<(), StoreError> {
    match serde_json::from_slice::<WatchEvent>(line) {
        Ok(event) => sender.send(event).await,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable watch event");
            Ok(())
        }
    }
}

/// Read the watch response body into `sender` until either side ends.
async fn pump_watch(response: Response, sender: WatchSender, descriptor: ResourceDescriptor) {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::default();

    loop {
        let chunk = tokio::select! {
            () = sender.stopped() => {
                debug!(%descriptor, "Watch released by consumer");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for line in lines.push(&bytes) {
                    if forward_line(&line, &sender).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(%descriptor, error = %e, "Watch stream failed");
                return;
            }
            None => {
                if let Some(line) = lines.finish() {
                    let _ = forward_line(&line, &sender).await;
                }
                debug!(%descriptor, "Watch stream ended");
                return;
            }
        }
    }
}

#[async_trait]
impl ResourceStore for HttpResourceStore {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
        options: &Options,
        subresources: &[String],
    ) -> Result<Object, StoreError> {
        let url = self.url(descriptor, namespace, Some(name), subresources)?;
        let query = query_pairs(options);
        self.fetch(Method::GET, url, |builder| builder.query(&query)).await
    }

    async fn list(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        options: &Options,
    ) -> Result<ObjectList, StoreError> {
        let url = self.url(descriptor, namespace, None, &[])?;
        let query = query_pairs(options);
        self.fetch(Method::GET, url, |builder| builder.query(&query)).await
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        object: &Object,
        options: &Options,
        subresources: &[String],
    ) -> Result<Object, StoreError> {
        let url = if subresources.is_empty() {
            self.url(descriptor, namespace, None, &[])?
        } else {
            let name = object
                .name()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| StoreError::invalid("name is required"))?;
            self.url(descriptor, namespace, Some(name), subresources)?
        };
        let query = query_pairs(options);
        self.fetch(Method::POST, url, |builder| builder.query(&query).json(object)).await
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
        options: Option<&Options>,
        subresources: &[String],
    ) -> Result<(), StoreError> {
        let url = self.url(descriptor, namespace, Some(name), subresources)?;
        let body = options.map(delete_body);
        self.send(Method::DELETE, url, |builder| match &body {
            Some(body) => builder.json(body),
            None => builder,
        })
        .await?;
        Ok(())
    }

    async fn watch(
        &self,
        descriptor: &ResourceDescriptor,
        options: &Options,
    ) -> Result<Watch, StoreError> {
        let url = self.url(descriptor, "", None, &[])?;
        let mut query = query_pairs(options);
        query.retain(|(key, _)| key != "watch");
        query.push(("watch".into(), "true".into()));

        let response = self
            .send(Method::GET, url, |builder| builder.query(&query))
            .await?;

        let (sender, watch) = Watch::channel(descriptor.clone(), DEFAULT_WATCH_CAPACITY);
        tokio::spawn(pump_watch(response, sender, descriptor.clone()));
        debug!(%descriptor, "Watch opened");
        Ok(watch)
    }
}
