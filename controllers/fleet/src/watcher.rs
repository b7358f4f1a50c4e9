//! Kubernetes resource watchers.
//!
//! Watches `Fleet` objects and every child kind they own, and drives the
//! reconciler through `kube_runtime::Controller`. A change to an owned
//! Deployment, Service, Secret, ConfigMap or PVC requeues its fleet, so
//! out-of-band edits are reverted.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, fleet_key};
use crds::Fleet;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Reconcile one fleet. Success clears its backoff and waits for the next
/// change.
async fn reconcile(fleet: Arc<Fleet>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let namespace = fleet.namespace().unwrap_or_default();
    let name = fleet.name_any();
    debug!("Reconciling Fleet {}/{}", namespace, name);

    reconciler.reconcile(&namespace, &name).await?;
    reconciler.reset_error(&fleet_key(&namespace, &name));
    Ok(Action::await_change())
}

/// Requeue a failed fleet with Fibonacci backoff.
fn error_policy(fleet: Arc<Fleet>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let key = fleet_key(&fleet.namespace().unwrap_or_default(), &fleet.name_any());
    reconciler.increment_error(&key);
    let (backoff_seconds, error_count) = reconciler.get_backoff_for_resource(&key);
    error!(
        "Reconciliation error for Fleet {} (error #{}): {}, retrying in {}s",
        key, error_count, error, backoff_seconds
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watches fleets and their children.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    /// Namespace to watch; all namespaces when `None`
    namespace: Option<String>,
    concurrency: u16,
    debounce: Duration,
}

impl Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("namespace", &self.namespace)
            .field("concurrency", &self.concurrency)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        client: Client,
        namespace: Option<String>,
        concurrency: u16,
        debounce: Duration,
    ) -> Self {
        Self {
            reconciler,
            client,
            namespace,
            concurrency,
            debounce,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Starts watching Fleet resources. Runs until the watch stream ends.
    pub async fn watch_fleets(&self) -> Result<(), ControllerError> {
        info!(
            "Starting Fleet watcher (namespace: {}, concurrency: {}, debounce: {:?})",
            self.namespace.as_deref().unwrap_or("all"),
            self.concurrency,
            self.debounce
        );

        // Debounce batches bursts of child events into one pass per fleet
        let controller_config = ControllerConfig::default()
            .debounce(self.debounce)
            .concurrency(self.concurrency);

        Controller::new(self.api::<Fleet>(), watcher::Config::default())
            .owns(self.api::<Deployment>(), watcher::Config::default())
            .owns(self.api::<Service>(), watcher::Config::default())
            .owns(self.api::<Secret>(), watcher::Config::default())
            .owns(self.api::<ConfigMap>(), watcher::Config::default())
            .owns(self.api::<PersistentVolumeClaim>(), watcher::Config::default())
            .with_config(controller_config)
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled {}", object),
                    Err(e) => error!("Controller error for Fleet: {}", e),
                }
            })
            .await;

        Ok(())
    }
}
