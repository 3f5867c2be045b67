//! # Watch Events
//!
//! A change notification from the store and the envelope the forwarder
//! publishes for it.

use serde::{Deserialize, Serialize};

use crate::object::Object;

/// Kind of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventType {
    #[serde(alias = "ADDED")]
    Added,
    #[serde(alias = "MODIFIED")]
    Modified,
    #[serde(alias = "DELETED")]
    Deleted,
    #[serde(alias = "BOOKMARK")]
    Bookmark,
    /// The object is a status document describing a watch failure.
    #[serde(alias = "ERROR")]
    Error,
}

/// One raw change notification as emitted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: Object,
}

impl WatchEvent {
    pub fn new(event_type: WatchEventType, object: Object) -> Self {
        Self { event_type, object }
    }

    pub fn added(object: Object) -> Self {
        Self::new(WatchEventType::Added, object)
    }

    pub fn modified(object: Object) -> Self {
        Self::new(WatchEventType::Modified, object)
    }

    pub fn deleted(object: Object) -> Self {
        Self::new(WatchEventType::Deleted, object)
    }
}

/// Outbound broadcast: an event tagged with the owning cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEventEnvelope {
    pub cluster: String,
    pub event: WatchEvent,
}
