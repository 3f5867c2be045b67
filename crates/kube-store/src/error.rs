//! # Store Errors

use std::time::Duration;

use shared_types::ResourceDescriptor;
use thiserror::Error;

/// Errors returned by a [`ResourceStore`](crate::ResourceStore).
///
/// The `Display` text is what requesters see in the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store rejected the call (Kubernetes `Status` failure).
    #[error("{message}")]
    Status {
        code: u16,
        reason: String,
        message: String,
    },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something that is not the expected document.
    #[error("failed to decode store response: {0}")]
    Decode(String),

    /// The call did not finish within its deadline.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store client could not be configured.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// The watch was stopped or its source went away.
    #[error("watch closed")]
    WatchClosed,
}

impl StoreError {
    /// A failure status with explicit fields.
    pub fn status(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// `404 NotFound`, worded the way the Kubernetes API server does.
    pub fn not_found(descriptor: &ResourceDescriptor, name: &str) -> Self {
        Self::status(
            404,
            "NotFound",
            format!("{} \"{}\" not found", qualified_resource(descriptor), name),
        )
    }

    /// `409 AlreadyExists`.
    pub fn already_exists(descriptor: &ResourceDescriptor, name: &str) -> Self {
        Self::status(
            409,
            "AlreadyExists",
            format!("{} \"{}\" already exists", qualified_resource(descriptor), name),
        )
    }

    /// `422 Invalid`.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::status(422, "Invalid", message)
    }

    /// HTTP-style status code, for `Status` errors.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(404)
    }
}

/// `pods` for the core group, `deployments.apps` otherwise.
fn qualified_resource(descriptor: &ResourceDescriptor) -> String {
    if descriptor.is_core() {
        descriptor.resource.clone()
    } else {
        format!("{}.{}", descriptor.resource, descriptor.group)
    }
}
