//! Fleet reconciliation.
//!
//! One pass over a fleet:
//! 1. patch `status.nodesCount` if it changed
//! 2. for every node in spec order, plan its resources with the peer
//!    addresses collected so far, converge them, and record the node's own
//!    address if it is a bootnode
//! 3. delete resources of nodes that left the fleet spec
//!
//! Planner and convergence errors abort the pass; nodes after the failing
//! one are left as they are until the next attempt.

pub mod converge;
pub mod gc;
pub mod naming;
pub mod peers;
pub mod planner;
pub mod quantity;

#[cfg(test)]
mod reconcile_test;

use crate::backoff::FibonacciBackoff;
use crate::client::{ClientStrategy, Images, strategy_for};
use crate::error::ControllerError;
use cluster_store::{ChildResource, ClusterStore};
use crds::{Fleet, FleetStatus, Node};
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use peers::PeerAddressBook;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Backoff state for a fleet
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::default(),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles fleets into their derived cluster resources.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) images: Images,
    /// Error count tracking per fleet (namespace/name -> BackoffState)
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}

/// Key used for per-fleet bookkeeping
pub fn fleet_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClusterStore>, images: Images) -> Self {
        Self {
            store,
            images,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the fleet and reconcile it. A fleet that no longer exists is a
    /// no-op: owner references take care of its resources.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        match self.store.get_fleet(namespace, name).await? {
            Some(fleet) => self.reconcile_fleet(&fleet).await,
            None => {
                debug!("Fleet {}/{} not found, nothing to reconcile", namespace, name);
                Ok(())
            }
        }
    }

    /// Run one reconciliation pass over `fleet`.
    pub async fn reconcile_fleet(&self, fleet: &Fleet) -> Result<(), ControllerError> {
        let name = fleet.name_any();
        let namespace = fleet
            .namespace()
            .ok_or_else(|| ControllerError::InvalidConfig(format!("fleet {} has no namespace", name)))?;
        info!("Reconciling fleet {}/{} ({} nodes)", namespace, name, fleet.spec.nodes.len());

        self.update_status(fleet, &namespace, &name).await?;

        let mut book = PeerAddressBook::new();
        for node in &fleet.spec.nodes {
            self.reconcile_node(fleet, node, &mut book).await?;
        }

        let report = gc::collect_garbage(self.store.as_ref(), fleet, &self.images).await;
        report.into_result()?;

        info!(
            "Fleet {}/{} reconciled ({} bootstrap peers)",
            namespace,
            name,
            book.len()
        );
        Ok(())
    }

    async fn update_status(&self, fleet: &Fleet, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let nodes_count = u32::try_from(fleet.spec.nodes.len()).unwrap_or(u32::MAX);
        if fleet.status.as_ref().map(|s| s.nodes_count) == Some(nodes_count) {
            return Ok(());
        }
        info!("Updating fleet {}/{} status: nodesCount={}", namespace, name, nodes_count);
        self.store
            .patch_fleet_status(namespace, name, &FleetStatus { nodes_count })
            .await?;
        Ok(())
    }

    async fn reconcile_node(
        &self,
        fleet: &Fleet,
        node: &Node,
        book: &mut PeerAddressBook,
    ) -> Result<(), ControllerError> {
        let strategy = strategy_for(&node.client, &self.images)?;
        let planned = planner::plan_node(strategy.as_ref(), fleet, node, book.snapshot())?;
        debug!(
            "Planned node {} ({}) with {} bootstrap peers",
            planned.node,
            strategy.name(),
            book.len()
        );

        let identity = planned.identity.clone();
        let mut endpoint = None;
        for resource in planned.into_resources() {
            if let ChildResource::Endpoint(service) = converge::converge(self.store.as_ref(), fleet, resource).await? {
                endpoint = Some(service);
            }
        }

        if let Some(identity) = identity {
            let address = peer_address(strategy.as_ref(), &identity, endpoint.as_ref(), node)?;
            debug!("Bootnode {} reachable at {}", node.name, address);
            book.append(address);
        }
        Ok(())
    }

    /// Get the next requeue delay (in seconds) and the error count for a fleet
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (crate::backoff::MIN_BACKOFF_SECS, 0)
            }
        }
    }

    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}

/// Bootstrap address of a bootnode from its identity and its Service's
/// cluster IP.
fn peer_address(
    strategy: &dyn ClientStrategy,
    identity: &str,
    endpoint: Option<&Service>,
    node: &Node,
) -> Result<String, ControllerError> {
    let ip = endpoint
        .and_then(|svc| svc.spec.as_ref())
        .and_then(|spec| spec.cluster_ip.as_deref())
        .filter(|ip| !ip.is_empty() && *ip != "None")
        .ok_or_else(|| {
            ControllerError::UnresolvedPeerAddress(format!("bootnode {} has no cluster IP yet", node.name))
        })?;
    Ok(strategy.peer_address(identity, ip, node))
}
