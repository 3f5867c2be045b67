//! # In-Memory Bus
//!
//! Single-process implementation of the bus, with NATS-like semantics:
//! wildcard subjects, reply addresses and competing-consumer queue groups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::message::Message;
use crate::publisher::Publisher;
use crate::subject::{
    matches, validate_publish_subject, validate_queue_group, validate_subscribe_subject,
};
use crate::subscriber::{Subscriber, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;

/// One registered subscription.
struct Route {
    sid: u64,
    pattern: String,
    group: Option<String>,
    sender: mpsc::Sender<Message>,
}

struct Inner {
    routes: RwLock<Vec<Route>>,
    /// Round-robin cursor per (pattern, group).
    cursors: Mutex<HashMap<(String, String), usize>>,
    next_sid: AtomicU64,
    published: AtomicU64,
    closed: AtomicBool,
    capacity: usize,
}

/// In-memory implementation of the bus.
///
/// Cloning is cheap; all clones share the same routing table.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with the given per-subscription buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                routes: RwLock::new(Vec::new()),
                cursors: Mutex::new(HashMap::new()),
                next_sid: AtomicU64::new(1),
                published: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.routes.read().len()
    }

    /// Total messages accepted for publishing.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Per-subscription buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Close the bus: every subscription ends and later calls fail.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.routes.write().clear();
        debug!("In-memory bus closed");
    }

    fn register(&self, subject: &str, group: Option<&str>) -> Result<Subscription, BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        validate_subscribe_subject(subject)?;
        if let Some(group) = group {
            validate_queue_group(group)?;
        }

        let sid = self.inner.next_sid.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        self.inner.routes.write().push(Route {
            sid,
            pattern: subject.to_string(),
            group: group.map(str::to_string),
            sender,
        });
        debug!(sid, subject, group = ?group, "Subscription registered");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(
            sid,
            subject,
            group.map(str::to_string),
            receiver,
            move |sid| {
                if let Some(inner) = weak.upgrade() {
                    inner.routes.write().retain(|route| route.sid != sid);
                }
            },
        ))
    }

    /// Deliver to one member of a queue group, starting at the round-robin
    /// cursor and skipping members that cannot take the message.
    fn deliver_to_group(&self, key: (String, String), members: &[&Route], msg: &Message) -> bool {
        let start = {
            let mut cursors = self.inner.cursors.lock();
            let cursor = cursors.entry(key).or_insert(0);
            let start = *cursor % members.len();
            *cursor = cursor.wrapping_add(1);
            start
        };

        for offset in 0..members.len() {
            let member = members[(start + offset) % members.len()];
            if member.sender.try_send(msg.clone()).is_ok() {
                return true;
            }
        }
        false
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        validate_publish_subject(subject)?;
        if let Some(reply) = reply {
            validate_publish_subject(reply)?;
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let msg = Message::new(subject, reply.map(str::to_string), payload);

        let routes = self.inner.routes.read();
        let mut delivered = 0usize;
        let mut groups: HashMap<(String, String), Vec<&Route>> = HashMap::new();

        for route in routes.iter().filter(|r| matches(&r.pattern, subject)) {
            match &route.group {
                Some(group) => groups
                    .entry((route.pattern.clone(), group.clone()))
                    .or_default()
                    .push(route),
                None => match route.sender.try_send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(subject, sid = route.sid, "Subscriber buffer full, message dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                },
            }
        }

        for (key, members) in groups {
            let group = key.1.clone();
            if self.deliver_to_group(key, &members, &msg) {
                delivered += 1;
            } else {
                warn!(subject, group = %group, "No queue member could take message, dropped");
            }
        }

        debug!(subject, receivers = delivered, "Message published");
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBus {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        self.register(subject, None)
    }

    async fn queue_subscribe(&self, subject: &str, group: &str) -> Result<Subscription, BusError> {
        self.register(subject, Some(group))
    }
}
