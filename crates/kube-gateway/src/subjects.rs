//! # Bus Subjects
//!
//! The fixed subject names other systems integrate against.

/// Get one object.
pub const GET: &str = "kube.get";

/// List objects.
pub const LIST: &str = "kube.list";

/// Create an object.
pub const CREATE: &str = "kube.create";

/// Delete an object.
pub const DELETE: &str = "kube.delete";

/// Outbound store change events.
pub const EVENT_WATCH: &str = "kube.event.watch";

/// Competing-consumer group shared by every gateway instance.
pub const QUEUE_GROUP: &str = "kube-nats";

/// Every request subject, in registration order.
pub const REQUEST_SUBJECTS: [&str; 4] = [GET, LIST, CREATE, DELETE];
