//! # Operation Handler
//!
//! Subscribes one [`Operation`] to its subject as a competing consumer and
//! turns each inbound message into at most one reply.
//!
//! ```text
//!   Message ─▶ decode ─✗─▶ Malformed (warn, no reply)
//!                │
//!                ▼
//!          cluster owned? ─✗─▶ Ignored (trace, no reply)
//!                │
//!                ▼
//!          store call (deadline)
//!                │
//!       ┌────────┴────────┐
//!       ▼                 ▼
//!   Ok(reply)        Err(error)
//!   publish reply    publish {"error": ...}
//! ```
//!
//! Exactly one of the two publishes runs for every request that passes the
//! cluster check.

use std::sync::Arc;
use std::time::Duration;

use kube_store::{ResourceStore, StoreError};
use shared_bus::{Bus, Message, PublisherExt, Subscriber, Subscription};
use shared_types::{ClusterId, ClusterScoped, ErrorReply};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

use crate::error::GatewayError;
use crate::operation::{CreateOperation, DeleteOperation, GetOperation, ListOperation, Operation};
use crate::outcome::Outcome;
use crate::subjects::QUEUE_GROUP;

pub type GetHandler = OperationHandler<GetOperation>;
pub type ListHandler = OperationHandler<ListOperation>;
pub type CreateHandler = OperationHandler<CreateOperation>;
pub type DeleteHandler = OperationHandler<DeleteOperation>;

/// Limits applied by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Deadline for one store call.
    pub store_timeout: Duration,
    /// Requests processed concurrently by one handler.
    pub max_in_flight: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(30),
            max_in_flight: 64,
        }
    }
}

/// Bus handler for one operation.
pub struct OperationHandler<O: Operation> {
    operation: O,
    bus: Arc<dyn Bus>,
    cluster: ClusterId,
    store: Arc<dyn ResourceStore>,
    config: HandlerConfig,
    span: Span,
}

impl<O: Operation> OperationHandler<O> {
    /// Create a handler with a default span carrying `subject` and `cluster`.
    pub fn new(
        operation: O,
        bus: Arc<dyn Bus>,
        cluster: ClusterId,
        store: Arc<dyn ResourceStore>,
        config: HandlerConfig,
    ) -> Self {
        let span = info_span!("handler", subject = O::SUBJECT, cluster = %cluster);
        Self {
            operation,
            bus,
            cluster,
            store,
            config,
            span,
        }
    }

    /// Replace the span all of this handler's logging happens under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn subject(&self) -> &'static str {
        O::SUBJECT
    }

    #[must_use]
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Join the competing-consumer group on this handler's subject.
    ///
    /// Failure is a startup error naming the subject.
    pub async fn register(&self) -> Result<Subscription, GatewayError> {
        let subscription = self
            .bus
            .queue_subscribe(O::SUBJECT, QUEUE_GROUP)
            .await
            .map_err(|source| GatewayError::Subscribe {
                subject: O::SUBJECT,
                source,
            })?;
        info!(parent: &self.span, group = QUEUE_GROUP, "Subscribed");
        Ok(subscription)
    }

    /// Process messages until `shutdown` fires or the subscription ends.
    ///
    /// On shutdown the subscription is dropped first, then in-flight
    /// requests are awaited.
    pub async fn run(self: Arc<Self>, mut subscription: Subscription, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let tracker = TaskTracker::new();

        loop {
            let msg = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                msg = subscription.recv() => match msg {
                    Some(msg) => msg,
                    None => {
                        warn!(parent: &self.span, "Subscription closed");
                        break;
                    }
                },
            };

            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let handler = Arc::clone(&self);
            tracker.spawn(async move {
                let _permit = permit;
                handler.handle(msg).await;
            });
        }

        drop(subscription);
        tracker.close();
        if !tracker.is_empty() {
            debug!(parent: &self.span, in_flight = tracker.len(), "Waiting for in-flight requests");
        }
        tracker.wait().await;
        info!(parent: &self.span, "Handler stopped");
    }

    /// Process one inbound message.
    pub async fn handle(&self, msg: Message) -> Outcome {
        let span = self.span.clone();
        self.handle_inner(msg).instrument(span).await
    }

    async fn handle_inner(&self, msg: Message) -> Outcome {
        let request: O::Request = match msg.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Dropping malformed request");
                return Outcome::Malformed;
            }
        };

        if !self.cluster.owns(request.cluster()) {
            trace!(target_cluster = request.cluster(), "Request for another cluster");
            return Outcome::Ignored;
        }

        let result = match tokio::time::timeout(
            self.config.store_timeout,
            self.operation.call(self.store.as_ref(), request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.store_timeout)),
        };

        let Some(reply_to) = msg.reply.as_deref() else {
            warn!("Request has no reply subject, result discarded");
            return Outcome::NoReplySubject;
        };

        let (published, is_error) = match result {
            Ok(reply) => (self.bus.publish_json(reply_to, &reply).await, false),
            Err(e) => {
                debug!(error = %e, "Store call failed");
                (self.bus.publish_json(reply_to, &ErrorReply::new(&e)).await, true)
            }
        };

        match published {
            Ok(()) => {
                trace!(reply_to, is_error, "Reply published");
                Outcome::Replied { error: is_error }
            }
            Err(e) => {
                error!(reply_to, error = %e, "Failed to publish reply");
                Outcome::ReplyFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use kube_store::{InMemoryStore, StoreOp};
    use serde_json::{json, Value};
    use shared_bus::InMemoryBus;
    use shared_types::{Object, ResourceDescriptor};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);
    const INBOX: &str = "_INBOX.aPXtkzW5ztAmDooWta7P1B.hXe5Q0m7";

    fn pods() -> ResourceDescriptor {
        ResourceDescriptor::new("", "v1", "pods")
    }

    fn pod(name: &str) -> Object {
        let mut object = Object::new();
        object.set_metadata("name", name);
        object
    }

    fn handler<O: Operation>(
        op: O,
        bus: &InMemoryBus,
        store: &InMemoryStore,
    ) -> OperationHandler<O> {
        OperationHandler::new(
            op,
            Arc::new(bus.clone()),
            ClusterId::new("c1"),
            Arc::new(store.clone()),
            HandlerConfig::default(),
        )
    }

    fn request(subject: &str, body: Value) -> Message {
        Message::new(
            subject,
            Some(INBOX.to_string()),
            Bytes::from(body.to_string()),
        )
    }

    fn get_request(cluster: &str) -> Value {
        json!({
            "cluster": cluster,
            "groupVersionResource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": "foo",
            "name": "x",
        })
    }

    /// Collect everything published to the inbox so far.
    fn drain(inbox: &mut Subscription) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(Some(msg)) = inbox.try_recv() {
            out.push(msg.decode().unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_get_replies_with_object() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));
        let mut inbox = bus.subscribe(INBOX).await.unwrap();

        let outcome = handler(GetOperation, &bus, &store)
            .handle(request("kube.get", get_request("c1")))
            .await;

        assert_eq!(outcome, Outcome::Replied { error: false });
        let replies = drain(&mut inbox);
        assert_eq!(replies, vec![serde_json::to_value(pod("x")).unwrap()]);
    }

    #[tokio::test]
    async fn test_foreign_cluster_is_ignored() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        let mut inbox = bus.subscribe(INBOX).await.unwrap();

        let outcome = handler(GetOperation, &bus, &store)
            .handle(request("kube.get", get_request("c2")))
            .await;

        assert_eq!(outcome, Outcome::Ignored);
        assert!(!outcome.reached_store());
        assert_eq!(store.call_count(), 0);
        assert_eq!(bus.published_count(), 0);
        assert!(drain(&mut inbox).is_empty());
    }

    #[tokio::test]
    async fn test_store_error_sends_only_error_envelope() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.fail_next(
            StoreOp::Create,
            StoreError::status(403, "Forbidden", "quota exceeded"),
        );
        let mut inbox = bus.subscribe(INBOX).await.unwrap();

        let outcome = handler(CreateOperation, &bus, &store)
            .handle(request(
                "kube.create",
                json!({
                    "cluster": "c1",
                    "groupVersionResource": {"version": "v1", "resource": "pods"},
                    "namespace": "foo",
                    "resource": {"metadata": {"name": "x"}},
                }),
            ))
            .await;

        assert_eq!(outcome, Outcome::Replied { error: true });
        assert_eq!(drain(&mut inbox), vec![json!({"error": "quota exceeded"})]);
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_replies_with_empty_marker() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));
        let mut inbox = bus.subscribe(INBOX).await.unwrap();

        let outcome = handler(DeleteOperation, &bus, &store)
            .handle(request(
                "kube.delete",
                json!({
                    "cluster": "c1",
                    "groupVersionResource": {"version": "v1", "resource": "pods"},
                    "namespace": "foo",
                    "name": "x",
                    "deleteOptions": null,
                }),
            ))
            .await;

        assert_eq!(outcome, Outcome::Replied { error: false });
        assert_eq!(drain(&mut inbox), vec![json!({})]);
    }

    #[tokio::test]
    async fn test_not_found_is_error_reply() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        let mut inbox = bus.subscribe(INBOX).await.unwrap();

        handler(GetOperation, &bus, &store)
            .handle(request("kube.get", get_request("c1")))
            .await;

        assert_eq!(
            drain(&mut inbox),
            vec![json!({"error": "pods \"x\" not found"})]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();

        let msg = Message::new("kube.get", Some(INBOX.into()), Bytes::from_static(b"{not json"));
        let outcome = handler(GetOperation, &bus, &store).handle(msg).await;

        assert_eq!(outcome, Outcome::Malformed);
        assert_eq!(store.call_count(), 0);
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_reply_subject_still_calls_store() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));

        let msg = Message::new("kube.get", None, Bytes::from(get_request("c1").to_string()));
        let outcome = handler(GetOperation, &bus, &store).handle(msg).await;

        assert_eq!(outcome, Outcome::NoReplySubject);
        assert_eq!(store.call_count(), 1);
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_publish_failure_is_reported() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));
        let h = handler(GetOperation, &bus, &store);
        bus.close();

        let outcome = h.handle(request("kube.get", get_request("c1"))).await;
        assert_eq!(outcome, Outcome::ReplyFailed);
    }

    #[tokio::test]
    async fn test_repeated_get_is_byte_identical() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));
        let mut inbox = bus.subscribe(INBOX).await.unwrap();
        let h = handler(GetOperation, &bus, &store);

        h.handle(request("kube.get", get_request("c1"))).await;
        h.handle(request("kube.get", get_request("c1"))).await;

        let first = inbox.try_recv().unwrap().unwrap();
        let second = inbox.try_recv().unwrap().unwrap();
        assert_eq!(first.payload, second.payload);
    }

    #[tokio::test]
    async fn test_repeated_list_is_byte_identical() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        for name in ["a", "b", "c"] {
            store.insert(&pods(), "foo", pod(name));
        }
        let mut inbox = bus.subscribe(INBOX).await.unwrap();
        let h = handler(ListOperation, &bus, &store);
        let list = json!({
            "cluster": "c1",
            "groupVersionResource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": "foo",
            "listOptions": {"limit": 10},
        });

        assert_eq!(
            h.handle(request("kube.list", list.clone())).await,
            Outcome::Replied { error: false }
        );
        assert_eq!(
            h.handle(request("kube.list", list)).await,
            Outcome::Replied { error: false }
        );

        let first = inbox.try_recv().unwrap().unwrap();
        let second = inbox.try_recv().unwrap().unwrap();
        assert_eq!(first.payload, second.payload);
        let body: Value = first.decode().unwrap();
        assert_eq!(body["items"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_path_special_name_reaches_store_verbatim() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("a/b?c#d"));
        let mut inbox = bus.subscribe(INBOX).await.unwrap();

        let mut body = get_request("c1");
        body["name"] = json!("a/b?c#d");
        let outcome = handler(GetOperation, &bus, &store)
            .handle(request("kube.get", body))
            .await;

        assert_eq!(outcome, Outcome::Replied { error: false });
        let replies = drain(&mut inbox);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["metadata"]["name"], "a/b?c#d");
    }

    struct SlowStore;

    #[async_trait::async_trait]
    impl ResourceStore for SlowStore {
        async fn get(
            &self,
            _: &ResourceDescriptor,
            _: &str,
            _: &str,
            _: &shared_types::Options,
            _: &[String],
        ) -> Result<Object, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Object::new())
        }

        async fn list(
            &self,
            _: &ResourceDescriptor,
            _: &str,
            _: &shared_types::Options,
        ) -> Result<shared_types::ObjectList, StoreError> {
            Err(StoreError::Unavailable("unused".into()))
        }

        async fn create(
            &self,
            _: &ResourceDescriptor,
            _: &str,
            _: &Object,
            _: &shared_types::Options,
            _: &[String],
        ) -> Result<Object, StoreError> {
            Err(StoreError::Unavailable("unused".into()))
        }

        async fn delete(
            &self,
            _: &ResourceDescriptor,
            _: &str,
            _: &str,
            _: Option<&shared_types::Options>,
            _: &[String],
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("unused".into()))
        }

        async fn watch(
            &self,
            _: &ResourceDescriptor,
            _: &shared_types::Options,
        ) -> Result<kube_store::Watch, StoreError> {
            Err(StoreError::Unavailable("unused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_deadline_becomes_error_reply() {
        let bus = InMemoryBus::new();
        let mut inbox = bus.subscribe(INBOX).await.unwrap();
        let h = OperationHandler::new(
            GetOperation,
            Arc::new(bus.clone()),
            ClusterId::new("c1"),
            Arc::new(SlowStore),
            HandlerConfig {
                store_timeout: Duration::from_millis(50),
                max_in_flight: 1,
            },
        );

        let outcome = h.handle(request("kube.get", get_request("c1"))).await;
        assert_eq!(outcome, Outcome::Replied { error: true });
        assert_eq!(
            drain(&mut inbox),
            vec![json!({"error": "store call timed out after 50ms"})]
        );
    }

    #[tokio::test]
    async fn test_register_and_run_until_shutdown() {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));
        let h = Arc::new(handler(GetOperation, &bus, &store));

        let subscription = h.register().await.unwrap();
        assert_eq!(subscription.queue_group(), Some(QUEUE_GROUP));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&h).run(subscription, shutdown.clone()));

        let reply = shared_bus::request(
            &bus,
            "kube.get",
            Bytes::from(get_request("c1").to_string()),
            WAIT,
        )
        .await
        .unwrap();
        let object: Object = reply.decode().unwrap();
        assert_eq!(object.name(), Some("x"));

        shutdown.cancel();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_register_failure_names_subject() {
        let bus = InMemoryBus::new();
        bus.close();
        let err = handler(ListOperation, &bus, &InMemoryStore::new())
            .register()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("kube.list"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// A request for any other cluster never reaches the store or the bus.
            #[test]
            fn foreign_cluster_never_replies(cluster in "[a-zA-Z0-9._-]{0,16}") {
                prop_assume!(cluster != "c1");
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let (outcome, calls, published) = rt.block_on(async {
                    let bus = InMemoryBus::new();
                    let store = InMemoryStore::new();
                    store.insert(&pods(), "foo", pod("x"));
                    let outcome = handler(GetOperation, &bus, &store)
                        .handle(request("kube.get", get_request(&cluster)))
                        .await;
                    (outcome, store.call_count(), bus.published_count())
                });
                prop_assert_eq!(outcome, Outcome::Ignored);
                prop_assert_eq!(calls, 0);
                prop_assert_eq!(published, 0);
            }

            /// A request for this cluster gets exactly one reply.
            #[test]
            fn own_cluster_gets_exactly_one_reply(fail in any::<bool>()) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let replies = rt.block_on(async {
                    let bus = InMemoryBus::new();
                    let store = InMemoryStore::new();
                    store.insert(&pods(), "foo", pod("x"));
                    if fail {
                        store.fail_next(StoreOp::Get, StoreError::Unavailable("down".into()));
                    }
                    let mut inbox = bus.subscribe(INBOX).await.unwrap();
                    handler(GetOperation, &bus, &store)
                        .handle(request("kube.get", get_request("c1")))
                        .await;
                    drain(&mut inbox)
                });
                prop_assert_eq!(replies.len(), 1);
                prop_assert_eq!(replies[0].get("error").is_some(), fail);
            }
        }
    }
}
