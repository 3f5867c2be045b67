//! # Bus Message

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::error::BusError;

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published to.
    pub subject: String,
    /// Reply address supplied by the publisher, if any.
    pub reply: Option<String>,
    /// Raw payload.
    pub payload: Bytes,
}

impl Message {
    pub fn new(subject: impl Into<String>, reply: Option<String>, payload: Bytes) -> Self {
        Self {
            subject: subject.into(),
            reply,
            payload,
        }
    }

    /// Decode the payload as a JSON envelope.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        codec::decode(&self.payload)
    }
}
