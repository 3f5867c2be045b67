//! # Kube Gateway
//!
//! Exposes a resource store over a message bus for one named cluster.
//!
//! ## Architecture
//!
//! ```text
//!   requester ──kube.get/list/create/delete──▶ ┌─────────────────────┐
//!             ◀────────── reply ────────────── │ OperationHandler ×4 │──▶ ResourceStore
//!                                              └─────────────────────┘
//!                                              ┌─────────────────────┐
//!   subscribers ◀──── kube.event.watch ─────── │   WatchForwarder    │◀── store.watch(v1/events)
//!                                              └─────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Handlers join the `kube-nats` queue group, so identical gateways for
//!   the same cluster share the load.
//! - A request whose `cluster` is not this gateway's identity is dropped
//!   without a store call or a reply.
//! - Every other decoded request gets exactly one reply: the store result
//!   or `{"error": "<message>"}`.
//! - The forwarder publishes one `{cluster, event}` envelope per store
//!   event, in order.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod forwarder;
pub mod handler;
pub mod operation;
pub mod outcome;
pub mod restart;
pub mod subjects;

pub use error::GatewayError;
pub use forwarder::{WatchExit, WatchForwarder, WatchRun};
pub use handler::{
    CreateHandler, DeleteHandler, GetHandler, HandlerConfig, ListHandler, OperationHandler,
};
pub use operation::{CreateOperation, DeleteOperation, GetOperation, ListOperation, Operation};
pub use outcome::Outcome;
pub use restart::{Backoff, RestartPolicy};
