//! vitess-operator
//!
//! Normalizes stored cluster topologies and reconciles them to the
//! infrastructure resources that run them.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vto_operator::{config, manifest::Manifest, store::InMemoryStore, worker::ReconcileWorker};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to VTO_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting vitess-operator");
    info!(
        namespace = %config.namespace,
        resync_interval_secs = config.resync_interval.as_secs(),
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryStore::new());

    if let Some(path) = config.manifest.as_deref() {
        let manifest = match Manifest::load(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(error = %e, "Failed to load manifest");
                return Err(e.into());
            }
        };
        manifest.seed(store.as_ref(), &config.namespace).await?;
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ReconcileWorker::new(store, config.namespace.clone(), config.resync_interval)
        .with_backoff(config.error_backoff_base, config.error_backoff_max);
    let mut worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            worker.run(shutdown_rx).await;
        }
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "Reconcile worker panicked");
                return Err(e.into());
            }
            warn!("Reconcile worker exited before shutdown");
            return Ok(());
        }
    }

    // Signal shutdown to the worker
    let _ = shutdown_tx.send(true);

    info!("Waiting for worker to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Reconcile worker did not shut down in time");
    }

    info!("Operator shutdown complete");
    Ok(())
}
