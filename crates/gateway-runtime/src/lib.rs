//! # kube-nats Gateway Runtime
//!
//! Wires the bus, the store and the gateway units together.
//!
//! ## Startup Sequence
//!
//! 1. Load [`GatewayConfig`] from the environment (missing `CLUSTER` is fatal)
//! 2. Connect the bus and build the store client
//! 3. Register the Get / List / Create / Delete handlers (any failure is fatal)
//! 4. Start the watch forwarder when `PUBLISH_EVENTS` is true
//! 5. Run until Ctrl-C / SIGTERM, then cancel every task and wait for them
//!
//! ```text
//!              ┌──────────────── GatewayRuntime ────────────────┐
//!   NatsBus ──▶│ GetHandler  ListHandler  CreateHandler  Delete │◀── HttpResourceStore
//!              │ WatchForwarder (optional, restart w/ backoff)  │
//!              └───────────── BackgroundTasks + token ──────────┘
//! ```

pub mod config;
pub mod runtime;
pub mod tasks;

pub use config::{ConfigError, GatewayConfig, StoreSettings};
pub use runtime::{GatewayRuntime, RuntimeError};
pub use tasks::{BackgroundTasks, TaskKind};
