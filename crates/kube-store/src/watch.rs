//! # Scoped Watch Handle
//!
//! A [`Watch`] is the consumer end of a store change stream. The producer
//! end, a [`WatchSender`], is held by whatever feeds it (an HTTP stream task,
//! the in-memory store). Stopping or dropping the `Watch` releases the
//! producer: its sends fail and [`WatchSender::stopped`] resolves.

use shared_types::{ResourceDescriptor, WatchEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Consumer end of a watch.
#[derive(Debug)]
pub struct Watch {
    descriptor: ResourceDescriptor,
    events: mpsc::Receiver<WatchEvent>,
    stop: CancellationToken,
}

/// Producer end of a watch.
#[derive(Debug, Clone)]
pub struct WatchSender {
    events: mpsc::Sender<WatchEvent>,
    stop: CancellationToken,
}

impl Watch {
    /// Create a connected producer / consumer pair.
    pub fn channel(descriptor: ResourceDescriptor, capacity: usize) -> (WatchSender, Watch) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stop = CancellationToken::new();
        (
            WatchSender {
                events: tx,
                stop: stop.clone(),
            },
            Watch {
                descriptor,
                events: rx,
                stop,
            },
        )
    }

    /// Resource type being watched.
    #[must_use]
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the source has closed or the watch was stopped.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        if self.stop.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.stop.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Release the watch. Idempotent.
    pub fn stop(&mut self) {
        if !self.stop.is_cancelled() {
            self.stop.cancel();
            self.events.close();
            debug!(descriptor = %self.descriptor, "Watch stopped");
        }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WatchSender {
    /// Deliver an event, waiting for buffer space.
    pub async fn send(&self, event: WatchEvent) -> Result<(), StoreError> {
        if self.stop.is_cancelled() {
            return Err(StoreError::WatchClosed);
        }
        self.events
            .send(event)
            .await
            .map_err(|_| StoreError::WatchClosed)
    }

    /// Deliver without waiting. A full buffer drops the event.
    pub fn try_send(&self, event: WatchEvent) -> Result<(), StoreError> {
        if self.stop.is_cancelled() {
            return Err(StoreError::WatchClosed);
        }
        match self.events.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event_type = ?event.event_type, "Watch buffer full, event dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(StoreError::WatchClosed),
        }
    }

    /// Whether the consumer has released the watch.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled() || self.events.is_closed()
    }

    /// Resolves once the consumer stops the watch.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }
}
