//! # Shared Types Crate
//!
//! This crate contains every JSON shape that crosses the bus: the resource
//! descriptor, the four request envelopes, the reply / error envelopes and
//! the watch event envelope.
//!
//! ## Design Principles
//!
//! - **Opaque documents**: store objects are schema-less. They are carried as
//!   [`Object`] / [`ObjectList`] and never inspected by the gateway.
//! - **Immutable envelopes**: envelopes are plain values; handlers consume
//!   them by value and never modify them after decoding.
//! - **Wire compatibility**: field names follow the reference JSON contract
//!   (`groupVersionResource`, `getOptions`, ...) so existing requesters keep
//!   working.

pub mod cluster;
pub mod descriptor;
pub mod object;
pub mod replies;
pub mod requests;
pub mod watch;

pub use cluster::ClusterId;
pub use descriptor::ResourceDescriptor;
pub use object::{NotAnObject, Object, ObjectList, Options};
pub use replies::{Deleted, ErrorReply, Reply};
pub use requests::{ClusterScoped, CreateRequest, DeleteRequest, GetRequest, ListRequest};
pub use watch::{WatchEvent, WatchEventEnvelope, WatchEventType};

/// Deserialize `null` as the type's default value.
///
/// Go encoders emit `null` for nil slices and maps; requesters written
/// against the reference gateway rely on that being accepted.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize;
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
