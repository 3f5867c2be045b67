//! # Gateway Runtime
//!
//! Owns the shared bus and store handles and the background tasks that use
//! them. Registration happens in [`GatewayRuntime::start`]; every unit then
//! runs independently until [`GatewayRuntime::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use kube_gateway::{
    CreateOperation, DeleteOperation, GatewayError, GetOperation, ListOperation, Operation,
    OperationHandler, WatchForwarder,
};
use kube_store::ResourceStore;
use shared_bus::Bus;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};

use crate::config::GatewayConfig;
use crate::tasks::{BackgroundTasks, TaskKind};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("gateway runtime already started")]
    AlreadyStarted,
}

pub struct GatewayRuntime {
    config: GatewayConfig,
    bus: Arc<dyn Bus>,
    store: Arc<dyn ResourceStore>,
    tasks: BackgroundTasks,
    started: bool,
}

impl GatewayRuntime {
    pub fn new(config: GatewayConfig, bus: Arc<dyn Bus>, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            config,
            bus,
            store,
            tasks: BackgroundTasks::new(),
            started: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register the four request handlers, then start the watch forwarder
    /// if event publishing is enabled.
    ///
    /// Returns on the first registration failure. Handlers registered
    /// before the failure keep running until [`shutdown`](Self::shutdown).
    pub async fn start(&mut self) -> Result<(), RuntimeError> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.started = true;

        info!(
            cluster = %self.config.cluster,
            publish_events = self.config.publish_events,
            store_timeout_ms = self.config.handler.store_timeout.as_millis() as u64,
            max_in_flight = self.config.handler.max_in_flight,
            "Starting kube-nats gateway"
        );

        self.start_handler(GetOperation).await?;
        self.start_handler(ListOperation).await?;
        self.start_handler(CreateOperation).await?;
        self.start_handler(DeleteOperation).await?;

        if self.config.publish_events {
            self.start_forwarder();
        } else {
            info!("Event publishing disabled");
        }

        self.tasks.log_summary();
        Ok(())
    }

    async fn start_handler<O: Operation>(&mut self, operation: O) -> Result<(), GatewayError> {
        let span = info_span!("handler", subject = O::SUBJECT, cluster = %self.config.cluster);
        let handler = Arc::new(
            OperationHandler::new(
                operation,
                Arc::clone(&self.bus),
                self.config.cluster.clone(),
                Arc::clone(&self.store),
                self.config.handler,
            )
            .with_span(span),
        );

        let subscription = handler.register().await?;
        let shutdown = self.tasks.shutdown_token();
        self.tasks
            .spawn(O::SUBJECT, TaskKind::Handler, handler.run(subscription, shutdown));
        Ok(())
    }

    fn start_forwarder(&mut self) {
        let forwarder = WatchForwarder::new(
            Arc::clone(&self.bus),
            self.config.cluster.clone(),
            Arc::clone(&self.store),
        );
        let span = info_span!(
            "watch_forwarder",
            resource = %forwarder.descriptor(),
            cluster = %self.config.cluster
        );
        let forwarder = forwarder.with_span(span);
        let policy = self.config.restart.clone();
        let shutdown = self.tasks.shutdown_token();

        self.tasks.spawn("watch_forwarder", TaskKind::Forwarder, async move {
            if let Err(e) = forwarder.run_with_restart(&policy, shutdown).await {
                error!(error = %e, "Watch forwarder stopped");
            }
        });
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.tasks.shutdown_token()
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Resolve once any request handler has stopped on its own, checking
    /// every `interval`. A handler stops early when its subscription ends.
    pub async fn handler_failure(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if self.tasks.check_health(TaskKind::Handler) > 0 {
                return;
            }
        }
    }

    /// Cancel every unit and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        info!(cluster = %self.config.cluster, "Stopping kube-nats gateway");
        self.tasks.shutdown().await;
    }
}
