//! # Handler Outcomes

use std::fmt;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Addressed to another cluster: no store call, no reply.
    Ignored,
    /// The payload did not decode: no store call, no reply.
    Malformed,
    /// One reply was published. `error` tells whether it was an error envelope.
    Replied { error: bool },
    /// The store was called but the reply could not be published.
    ReplyFailed,
    /// The store was called but the request named no reply subject.
    NoReplySubject,
}

impl Outcome {
    /// Whether the message was handed to the store.
    #[must_use]
    pub fn reached_store(&self) -> bool {
        !matches!(self, Self::Ignored | Self::Malformed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ignored => "ignored",
            Self::Malformed => "malformed",
            Self::Replied { error: false } => "replied",
            Self::Replied { error: true } => "replied-error",
            Self::ReplyFailed => "reply-failed",
            Self::NoReplySubject => "no-reply-subject",
        };
        f.write_str(text)
    }
}
