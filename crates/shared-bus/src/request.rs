//! # Request / Reply
//!
//! Requester-side helper: publish with a fresh reply subject and wait for
//! the first answer.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::error::BusError;
use crate::{Bus, INBOX_PREFIX};

/// Generate a unique reply subject.
#[must_use]
pub fn new_inbox() -> String {
    format!("{}.{}", INBOX_PREFIX, Uuid::new_v4().simple())
}

/// Publish `payload` to `subject` and wait up to `timeout` for one reply.
///
/// The reply subscription is created before publishing so a fast responder
/// cannot be missed.
pub async fn request<B>(
    bus: &B,
    subject: &str,
    payload: Bytes,
    timeout: Duration,
) -> Result<crate::Message, BusError>
where
    B: Bus + ?Sized,
{
    let inbox = new_inbox();
    let mut replies = bus.subscribe(&inbox).await?;
    bus.publish_with_reply(subject, Some(&inbox), payload).await?;
    debug!(subject, inbox = %inbox, "Request published");

    match tokio::time::timeout(timeout, replies.recv()).await {
        Ok(Some(reply)) => Ok(reply),
        Ok(None) => Err(BusError::Closed),
        Err(_) => Err(BusError::Timeout(timeout)),
    }
}
