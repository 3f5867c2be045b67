//! # Gateway Errors

use kube_store::StoreError;
use shared_bus::BusError;
use thiserror::Error;

/// Failures of gateway units that the runtime has to act on.
///
/// Per-request failures never surface here: they become error replies.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A handler could not join its subject. Fatal at startup.
    #[error("failed to subscribe to {subject}: {source}")]
    Subscribe {
        subject: &'static str,
        #[source]
        source: BusError,
    },

    /// The watch forwarder could not open its watch.
    #[error("failed to open watch: {0}")]
    WatchOpen(#[source] StoreError),
}
