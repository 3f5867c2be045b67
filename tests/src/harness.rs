//! Shared fixtures for the end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gateway_runtime::{GatewayConfig, GatewayRuntime, RuntimeError};
use kube_store::InMemoryStore;
use serde_json::Value;
use shared_bus::{request, BusError, InMemoryBus};
use shared_types::{ClusterId, Object, ResourceDescriptor};

/// How long a requester waits for a reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// A started gateway and the handles the test drives it through.
pub struct TestGateway {
    pub bus: InMemoryBus,
    pub store: InMemoryStore,
    pub runtime: GatewayRuntime,
}

impl TestGateway {
    /// Start a gateway for `cluster` on a fresh bus.
    pub async fn start(cluster: &str, publish_events: bool) -> Result<Self, RuntimeError> {
        Self::start_on(InMemoryBus::new(), cluster, publish_events).await
    }

    /// Start a gateway for `cluster` on an existing bus.
    pub async fn start_on(
        bus: InMemoryBus,
        cluster: &str,
        publish_events: bool,
    ) -> Result<Self, RuntimeError> {
        let store = InMemoryStore::new();
        let mut config = GatewayConfig::new(ClusterId::new(cluster));
        config.publish_events = publish_events;

        let mut runtime =
            GatewayRuntime::new(config, Arc::new(bus.clone()), Arc::new(store.clone()));
        runtime.start().await?;
        Ok(Self { bus, store, runtime })
    }

    /// Send `payload` to `subject` and decode the reply.
    pub async fn request(&self, subject: &str, payload: &Value) -> Result<Value, BusError> {
        send(&self.bus, subject, payload).await
    }

    pub async fn stop(self) {
        self.runtime.shutdown().await;
    }
}

/// Request/reply over `bus` with [`REPLY_TIMEOUT`].
pub async fn send(bus: &InMemoryBus, subject: &str, payload: &Value) -> Result<Value, BusError> {
    let reply = request(bus, subject, Bytes::from(payload.to_string()), REPLY_TIMEOUT).await?;
    reply.decode()
}

#[must_use]
pub fn pods() -> ResourceDescriptor {
    ResourceDescriptor::new("", "v1", "pods")
}

/// A pod object as the store would hold it.
#[must_use]
pub fn pod(namespace: &str, name: &str) -> Object {
    Object::try_from(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"containers": [{"name": "app", "image": "nginx:1.27"}]}
    }))
    .unwrap_or_default()
}
