//! # Bus Errors

use std::time::Duration;

use thiserror::Error;

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The subject is not a valid bus subject.
    #[error("invalid subject {subject:?}: {reason}")]
    InvalidSubject {
        subject: String,
        reason: &'static str,
    },

    /// The queue group name is not valid.
    #[error("invalid queue group {0:?}")]
    InvalidQueueGroup(String),

    /// The bus connection is closed.
    #[error("bus connection closed")]
    Closed,

    /// Could not establish a connection.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Transport I/O failure.
    #[error("bus i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the wire protocol or reported an error.
    #[error("bus protocol error: {0}")]
    Protocol(String),

    /// Payload larger than the server accepts.
    #[error("payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Envelope could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Envelope could not be deserialized.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

impl BusError {
    pub(crate) fn invalid_subject(subject: &str, reason: &'static str) -> Self {
        Self::InvalidSubject {
            subject: subject.to_string(),
            reason,
        }
    }
}
