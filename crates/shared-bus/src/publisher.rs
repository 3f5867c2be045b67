//! # Publisher
//!
//! Defines the publishing side of the bus.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::codec;
use crate::error::BusError;

/// Trait for publishing messages to the bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload to `subject`, optionally naming a reply address.
    ///
    /// Succeeds once the transport has accepted the message; delivery is
    /// not confirmed.
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), BusError>;

    /// Publish a payload without a reply address.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.publish_with_reply(subject, None, payload).await
    }
}

/// JSON convenience methods for every [`Publisher`].
#[async_trait]
pub trait PublisherExt: Publisher {
    /// Encode `value` as JSON and publish it.
    async fn publish_json<T>(&self, subject: &str, value: &T) -> Result<(), BusError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = codec::encode(value)?;
        self.publish(subject, payload).await
    }
}

impl<P: Publisher + ?Sized> PublisherExt for P {}
