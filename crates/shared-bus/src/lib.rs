//! # Shared Bus - Subject-Based Publish/Subscribe
//!
//! The message bus capability the gateway is built on.
//!
//! ## Model
//!
//! ```text
//!   publish(subject, reply?, payload)
//!              │
//!              ▼
//!      ┌───────────────┐
//!      │      Bus      │  subject matching: `*` one token, `>` the rest
//!      └───────────────┘
//!         │         │
//!         ▼         ▼
//!   subscribe()   queue_subscribe(group)
//!   every sub     one member per group
//!   receives it   receives it (competing consumers)
//! ```
//!
//! ## Transports
//!
//! - [`InMemoryBus`]: single-process bus for tests and embedded use.
//! - [`NatsBus`]: NATS core protocol client over TCP.
//!
//! Delivery is at-most-once on both: a subscriber whose buffer is full loses
//! the message.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod codec;
pub mod error;
pub mod memory;
pub mod message;
pub mod nats;
pub mod publisher;
pub mod request;
pub mod subject;
pub mod subscriber;

// Re-export main types
pub use error::BusError;
pub use memory::InMemoryBus;
pub use message::Message;
pub use nats::{NatsBus, NatsOptions};
pub use publisher::{Publisher, PublisherExt};
pub use request::{new_inbox, request};
pub use subscriber::{Subscriber, Subscription};

/// Maximum messages buffered per subscription before new ones are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Prefix of generated reply subjects.
pub const INBOX_PREFIX: &str = "_INBOX";

/// A full bus capability: publish and subscribe.
///
/// Implemented for every type that is both a [`Publisher`] and a
/// [`Subscriber`], so `Arc<dyn Bus>` can be shared across tasks.
pub trait Bus: Publisher + Subscriber {}

impl<T: Publisher + Subscriber + ?Sized> Bus for T {}
