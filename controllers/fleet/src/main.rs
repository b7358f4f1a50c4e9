//! Fleet Controller
//!
//! Reconciles `Fleet` resources, ordered sets of Ethereum (geth, besu) and
//! IPFS nodes, into PersistentVolumeClaims, ConfigMaps, Secrets, Services and
//! Deployments. Bootnodes are handed to the nodes that follow them as
//! bootstrap peers.

mod backoff;
mod client;
mod config;
mod controller;
mod error;
mod keys;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube's rustls client needs a process-wide crypto provider
    rustls::crypto::ring::default_provider().install_default().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Fleet Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Geth image: {}", config.images.geth);
    info!("  Besu image: {}", config.images.besu);
    info!("  IPFS image: {}", config.images.ipfs);
    info!("  Store timeout: {:?}", config.store_timeout);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Debounce: {:?}", config.debounce);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
