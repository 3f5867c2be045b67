//! # Kube Store - Resource Store Capability
//!
//! The store the gateway turns bus requests into calls against.
//!
//! ```text
//!   ResourceStore ── get / list / create / delete ──▶ Object | ObjectList | ()
//!        │
//!        └─ watch(descriptor) ──▶ Watch ── next() ──▶ WatchEvent ...
//! ```
//!
//! ## Implementations
//!
//! - [`HttpResourceStore`]: Kubernetes REST API over `reqwest`, configured
//!   in-cluster from the service account or from an explicit URL.
//! - [`InMemoryStore`]: namespaced object map with watch fan-out and
//!   error injection, for tests and local runs.
//!
//! Objects are opaque JSON documents; the store never interprets options
//! beyond passing them on.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod watch;

use async_trait::async_trait;
use shared_types::{Object, ObjectList, Options, ResourceDescriptor};

pub use config::StoreConfig;
pub use error::StoreError;
pub use http::HttpResourceStore;
pub use memory::{InMemoryStore, StoreOp};
pub use watch::{Watch, WatchSender};

/// Events buffered per watch before the producer waits.
pub const DEFAULT_WATCH_CAPACITY: usize = 256;

/// A Kubernetes-style resource store.
///
/// Implementations must be safe for concurrent use; the gateway shares one
/// instance across every handler task.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one object, or a subresource of it.
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
        options: &Options,
        subresources: &[String],
    ) -> Result<Object, StoreError>;

    /// List objects. An empty namespace lists across all namespaces.
    async fn list(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        options: &Options,
    ) -> Result<ObjectList, StoreError>;

    /// Create an object and return it as stored.
    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        object: &Object,
        options: &Options,
        subresources: &[String],
    ) -> Result<Object, StoreError>;

    /// Delete an object. `None` options mean the store defaults.
    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
        options: Option<&Options>,
        subresources: &[String],
    ) -> Result<(), StoreError>;

    /// Open a watch on every object of `descriptor` in all namespaces.
    async fn watch(
        &self,
        descriptor: &ResourceDescriptor,
        options: &Options,
    ) -> Result<Watch, StoreError>;
}
