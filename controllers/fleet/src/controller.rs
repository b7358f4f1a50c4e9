//! Main controller implementation.
//!
//! Builds the Kubernetes client and cluster store, checks the Fleet CRD is
//! installed, and runs the Fleet watcher until it exits or the process is
//! interrupted.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_store::KubeStore;
use crds::Fleet;
use kube::api::ListParams;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for fleet management.
#[derive(Debug)]
pub struct Controller {
    fleet_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Fleet Controller");

        let client = Client::try_default().await?;

        info!("Checking Fleet CRD is installed...");
        ensure_crd_installed(&client, config.namespace.as_deref()).await?;
        info!("Fleet CRD found");

        let store = KubeStore::new(client.clone(), config.store_timeout);
        let reconciler = Arc::new(Reconciler::new(Arc::new(store), config.images.clone()));

        let watcher = Watcher::new(
            reconciler,
            client,
            config.namespace.clone(),
            config.concurrency,
            config.debounce,
        );
        let fleet_watcher = tokio::spawn(async move { watcher.watch_fleets().await });

        Ok(Self { fleet_watcher })
    }

    /// Runs the controller until the watcher exits or Ctrl-C is received.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Fleet Controller running");

        tokio::select! {
            result = &mut self.fleet_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Fleet watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Fleet watcher error: {}", e)))?;
                error!("Fleet watcher exited unexpectedly");
                Err(ControllerError::Watch("Fleet watcher exited".to_string()))
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| ControllerError::Watch(format!("Failed to listen for shutdown signal: {}", e)))?;
                info!("Shutdown signal received, stopping Fleet Controller");
                self.fleet_watcher.abort();
                Ok(())
            }
        }
    }
}

/// Fail fast when the Fleet CRD is missing instead of watching forever.
async fn ensure_crd_installed(client: &Client, namespace: Option<&str>) -> Result<(), ControllerError> {
    let fleets: Api<Fleet> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    fleets.list(&ListParams::default().limit(1)).await.map_err(|e| {
        error!("Failed to list Fleet resources: {}", e);
        error!("Please ensure:");
        error!("  1. The Fleet CRD is installed (cargo run -p crds --bin crdgen | kubectl apply -f -)");
        error!("  2. The controller service account may list fleets.peerfleet.io");
        ControllerError::Kube(e)
    })?;
    Ok(())
}
