//! # kube-nats
//!
//! Serves a Kubernetes API server over NATS for one named cluster.
//!
//! ## Usage
//!
//! ```bash
//! CLUSTER=prod-eu NATS_URL=nats://nats:4222 PUBLISH_EVENTS=true kube-nats
//! ```
//!
//! Exits non-zero when configuration is invalid, the bus or the store is
//! unreachable at startup, a subject cannot be registered, or a request
//! handler stops while running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use gateway_runtime::{GatewayConfig, GatewayRuntime};
use gateway_telemetry::{init_telemetry, TelemetryConfig};
use kube_store::HttpResourceStore;
use shared_bus::NatsBus;
use tracing::{error, info};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let _telemetry_guard = init_telemetry(&telemetry).context("failed to initialise logging")?;

    if let Err(e) = run().await {
        error!(error = ?e, "kube-nats exited with an error");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = GatewayConfig::from_env().context("invalid configuration")?;
    info!(
        cluster = %config.cluster,
        nats_url = %config.nats_url,
        publish_events = config.publish_events,
        "Loaded configuration"
    );

    let bus = NatsBus::connect(config.nats_options())
        .await
        .with_context(|| format!("failed to connect to NATS at {}", config.nats_url))?;
    info!(server_id = %bus.server_id(), max_payload = bus.max_payload(), "Connected to NATS");

    let store_config = config
        .store_config()
        .context("failed to load Kubernetes client configuration")?;
    let store = HttpResourceStore::new(store_config).context("failed to create Kubernetes client")?;
    info!(api_url = %store.base_url(), "Kubernetes client ready");

    let mut runtime = GatewayRuntime::new(config, Arc::new(bus), Arc::new(store));
    if let Err(e) = runtime.start().await {
        runtime.shutdown().await;
        return Err(e).context("failed to start gateway");
    }
    info!("Gateway running, press Ctrl+C to stop");

    let handler_stopped = tokio::select! {
        signal = shutdown_signal() => {
            signal.context("failed to listen for shutdown signals")?;
            false
        }
        () = runtime.handler_failure(HEALTH_CHECK_INTERVAL) => true,
    };

    runtime.shutdown().await;
    if handler_stopped {
        bail!("a request handler stopped unexpectedly");
    }
    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
