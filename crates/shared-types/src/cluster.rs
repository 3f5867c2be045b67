//! # Cluster Identity
//!
//! The tag that selects which gateway instance reacts to a request. Fixed at
//! process start and shared read-only by every handler and the forwarder.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Process-wide cluster identity.
///
/// Cheap to clone: all clones share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(Arc<str>);

impl ClusterId {
    /// Create a cluster identity.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a request tagged with `cluster` targets this gateway.
    ///
    /// Exact, case-sensitive comparison. No normalisation is applied.
    #[must_use]
    pub fn owns(&self, cluster: &str) -> bool {
        &*self.0 == cluster
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClusterId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl PartialEq<str> for ClusterId {
    fn eq(&self, other: &str) -> bool {
        self.owns(other)
    }
}
