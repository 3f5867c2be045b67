//! # Resource Descriptor
//!
//! The (group, version, resource) triple naming a resource type in the store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a resource type in the store.
///
/// Equality is exact string-triple equality; no canonicalisation is done.
/// The core API group is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// API group, empty for the core group.
    #[serde(default, alias = "Group")]
    pub group: String,
    /// API version, e.g. `v1`.
    #[serde(alias = "Version")]
    pub version: String,
    /// Plural resource name, e.g. `pods`.
    #[serde(alias = "Resource", alias = "kind")]
    pub resource: String,
}

impl ResourceDescriptor {
    /// Create a descriptor.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Descriptor for the store's built-in change-event resource (`v1/events`).
    #[must_use]
    pub fn events() -> Self {
        Self::new("", "v1", "events")
    }

    /// Whether this descriptor names a resource in the core API group.
    #[must_use]
    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    /// `apiVersion` string for objects of this type (`v1`, `apps/v1`, ...).
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.is_core() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_core() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}
