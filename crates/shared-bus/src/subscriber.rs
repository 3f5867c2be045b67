//! # Subscriber
//!
//! Defines the subscription side of the bus.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

use crate::error::BusError;
use crate::message::Message;

/// Trait for subscribing to subjects on the bus.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Receive every message published to subjects matching `subject`.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError>;

    /// Join the competing-consumer group `group` on `subject`.
    ///
    /// Each message is delivered to exactly one member of the group.
    async fn queue_subscribe(&self, subject: &str, group: &str) -> Result<Subscription, BusError>;
}

type Unsubscribe = Box<dyn FnOnce(u64) + Send + Sync>;

/// A subscription handle for receiving messages.
///
/// When dropped, the subscription is removed from the bus.
pub struct Subscription {
    sid: u64,
    subject: String,
    queue_group: Option<String>,
    receiver: mpsc::Receiver<Message>,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    /// Create a subscription. `unsubscribe` runs once, on drop.
    pub fn new(
        sid: u64,
        subject: impl Into<String>,
        queue_group: Option<String>,
        receiver: mpsc::Receiver<Message>,
        unsubscribe: impl FnOnce(u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            sid,
            subject: subject.into(),
            queue_group,
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the bus side has gone away.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    ///
    /// - `Ok(Some(msg))` - a message was buffered
    /// - `Ok(None)` - nothing buffered right now
    /// - `Err(BusError::Closed)` - the bus side has gone away
    pub fn try_recv(&mut self) -> Result<Option<Message>, BusError> {
        match self.receiver.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BusError::Closed),
        }
    }

    /// Subscription id, unique per bus connection.
    #[must_use]
    pub fn sid(&self) -> u64 {
        self.sid
    }

    /// Subject (possibly a wildcard pattern) this subscription listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Queue group, for competing-consumer subscriptions.
    #[must_use]
    pub fn queue_group(&self) -> Option<&str> {
        self.queue_group.as_deref()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("sid", &self.sid)
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe(self.sid);
        }
        debug!(sid = self.sid, subject = %self.subject, "Subscription dropped");
    }
}
