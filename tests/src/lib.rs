//! # kube-nats Test Suite
//!
//! End-to-end scenarios: a full [`GatewayRuntime`](gateway_runtime::GatewayRuntime)
//! wired to the in-memory bus and store, driven the way a bus client would.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs            # TestGateway: runtime + bus + store handles
//! └── integration/
//!     ├── scenarios.rs      # get / foreign cluster / delete / create error / events
//!     └── cluster.rs        # competing consumers and shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p kube-nats-tests
//! cargo test -p kube-nats-tests integration::scenarios::
//! ```

pub mod harness;
pub mod integration;
