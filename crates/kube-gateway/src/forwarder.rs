//! # Watch Forwarder
//!
//! Republishes every store change event to `kube.event.watch`, tagged with
//! the cluster identity.
//!
//! ```text
//!   store.watch(v1/events) ─▶ Watch ─ next() ─▶ {cluster, event} ─▶ kube.event.watch
//! ```
//!
//! One run owns one watch. The watch is stopped on every exit path; a
//! failed open returns before anything needs releasing.

use std::sync::Arc;

use kube_store::ResourceStore;
use shared_bus::{Bus, PublisherExt};
use shared_types::{ClusterId, Options, ResourceDescriptor, WatchEventEnvelope};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, trace, warn, Span};

use crate::error::GatewayError;
use crate::restart::{jitter, RestartPolicy};
use crate::subjects::EVENT_WATCH;

/// Why a forwarding run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// Shutdown was requested.
    Cancelled,
    /// The event source closed the stream.
    StreamClosed,
}

/// Summary of one forwarding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchRun {
    pub exit: WatchExit,
    /// Envelopes published successfully.
    pub forwarded: u64,
}

/// Forwards store change events onto the bus.
pub struct WatchForwarder {
    bus: Arc<dyn Bus>,
    cluster: ClusterId,
    store: Arc<dyn ResourceStore>,
    descriptor: ResourceDescriptor,
    span: Span,
}

impl WatchForwarder {
    pub fn new(bus: Arc<dyn Bus>, cluster: ClusterId, store: Arc<dyn ResourceStore>) -> Self {
        let span = info_span!("watch_forwarder", subject = EVENT_WATCH, cluster = %cluster);
        Self {
            bus,
            cluster,
            store,
            descriptor: ResourceDescriptor::events(),
            span,
        }
    }

    /// Replace the span all of this forwarder's logging happens under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Resource type being watched.
    #[must_use]
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Open the watch and forward events until the stream closes or
    /// `shutdown` fires.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<WatchRun, GatewayError> {
        let options = Options::new();
        let opened = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                return Ok(WatchRun { exit: WatchExit::Cancelled, forwarded: 0 });
            }
            opened = self.store.watch(&self.descriptor, &options) => opened,
        };
        let mut watch = match opened {
            Ok(watch) => watch,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Failed to open watch");
                return Err(GatewayError::WatchOpen(e));
            }
        };
        info!(parent: &self.span, descriptor = %self.descriptor, "Forwarding watch events");

        let mut forwarded = 0u64;
        let exit = loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break WatchExit::Cancelled,
                event = watch.next() => event,
            };
            let Some(event) = event else {
                warn!(parent: &self.span, forwarded, "Watch stream closed");
                break WatchExit::StreamClosed;
            };

            let envelope = WatchEventEnvelope {
                cluster: self.cluster.to_string(),
                event,
            };
            match self.bus.publish_json(EVENT_WATCH, &envelope).await {
                Ok(()) => {
                    forwarded += 1;
                    trace!(parent: &self.span, event_type = ?envelope.event.event_type, "Event forwarded");
                }
                Err(e) => error!(parent: &self.span, error = %e, "Failed to publish watch event"),
            }
        };

        watch.stop();
        Ok(WatchRun { exit, forwarded })
    }

    /// Run, reopening the watch per `policy` until shutdown.
    ///
    /// With restart disabled this is a single [`run`](Self::run): an open
    /// failure is returned, a closed stream ends quietly.
    pub async fn run_with_restart(
        &self,
        policy: &RestartPolicy,
        shutdown: CancellationToken,
    ) -> Result<(), GatewayError> {
        let mut backoff = policy.backoff();

        loop {
            let result = self.run(&shutdown).await;
            match &result {
                Ok(WatchRun {
                    exit: WatchExit::Cancelled,
                    ..
                }) => return Ok(()),
                Ok(run) if run.forwarded > 0 => backoff.reset(),
                _ => {}
            }
            if !policy.enabled {
                return result.map(|_| ());
            }

            let delay = jitter(backoff.next_delay());
            info!(
                parent: &self.span,
                delay_ms = delay.as_millis() as u64,
                "Restarting watch after backoff"
            );
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
