//! Garbage collection of resources whose node left the fleet spec.
//!
//! Owner references only cover whole-fleet teardown. Removing a node from the
//! spec leaves its resources owned by a fleet that still exists, so they are
//! found by label and deleted when their name is no longer derived.

use super::naming::{fleet_labels, resource_name};
use super::planner::wants_config;
use crate::client::{Images, strategy_for};
use crate::error::ControllerError;
use cluster_store::{ClusterStore, ResourceKind, StoreError};
use crds::{Fleet, Node};
use futures::future::join_all;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Outcome of one collection run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcReport {
    pub deleted: Vec<(ResourceKind, String)>,
    /// Kind and failure message, one entry per failed list or delete
    pub failures: Vec<(ResourceKind, String)>,
}

impl GcReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Convert a report with failures into `GarbageCollection`.
    pub fn into_result(self) -> Result<Self, ControllerError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(ControllerError::GarbageCollection(self.to_string()))
        }
    }
}

impl fmt::Display for GcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} deleted, {} failed", self.deleted.len(), self.failures.len())?;
        for (kind, message) in &self.failures {
            write!(f, "; {}: {}", kind, message)?;
        }
        Ok(())
    }
}

/// Names every kind should have for the current node list.
///
/// Uses the planner's predicates. A node whose client is unknown keeps every
/// name it could own; planning fails for it anyway, and nothing is deleted on
/// a guess.
pub fn desired_names(fleet: &Fleet, images: &Images) -> BTreeMap<ResourceKind, BTreeSet<String>> {
    let fleet_name = fleet.name_any();
    let mut names: BTreeMap<ResourceKind, BTreeSet<String>> =
        ResourceKind::ALL.iter().map(|k| (*k, BTreeSet::new())).collect();
    let mut want = |kind: ResourceKind, node: &Node| {
        if let Some(set) = names.get_mut(&kind) {
            set.insert(resource_name(&fleet_name, node, kind));
        }
    };

    for node in &fleet.spec.nodes {
        want(ResourceKind::Volume, node);
        want(ResourceKind::Workload, node);
        match strategy_for(&node.client, images) {
            Ok(strategy) => {
                if wants_config(strategy.as_ref(), &fleet.spec, node) {
                    want(ResourceKind::Config, node);
                }
                if node.needs_secret() {
                    want(ResourceKind::Secret, node);
                }
                if node.bootnode {
                    want(ResourceKind::Endpoint, node);
                }
            }
            Err(_) => {
                want(ResourceKind::Config, node);
                want(ResourceKind::Secret, node);
                want(ResourceKind::Endpoint, node);
            }
        }
    }
    names
}

/// Delete fleet-labelled resources that no current node derives.
///
/// Kinds are collected concurrently and independently: a failure in one kind
/// is recorded in the report and never stops another kind.
pub async fn collect_garbage(store: &dyn ClusterStore, fleet: &Fleet, images: &Images) -> GcReport {
    let namespace = fleet.namespace().unwrap_or_default();
    let fleet_name = fleet.name_any();
    let selector = fleet_labels(&fleet_name);
    let desired = desired_names(fleet, images);
    let empty = BTreeSet::new();

    let per_kind = ResourceKind::ALL.iter().map(|kind| {
        let keep = desired.get(kind).unwrap_or(&empty);
        collect_kind(store, *kind, &namespace, &selector, keep)
    });

    let mut report = GcReport::default();
    for (deleted, failures) in join_all(per_kind).await {
        report.deleted.extend(deleted);
        report.failures.extend(failures);
    }

    if report.is_clean() {
        debug!("Garbage collection for fleet {}/{}: {}", namespace, fleet_name, report);
    } else {
        warn!("Garbage collection for fleet {}/{}: {}", namespace, fleet_name, report);
    }
    report
}

type KindOutcome = (Vec<(ResourceKind, String)>, Vec<(ResourceKind, String)>);

async fn collect_kind(
    store: &dyn ClusterStore,
    kind: ResourceKind,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    keep: &BTreeSet<String>,
) -> KindOutcome {
    let mut deleted = Vec::new();
    let mut failures = Vec::new();

    let live = match store.list(kind, namespace, selector).await {
        Ok(live) => live,
        Err(e) => {
            error!("Failed to list {} in {}: {}", kind, namespace, e);
            failures.push((kind, format!("list failed: {}", e)));
            return (deleted, failures);
        }
    };

    for object in live {
        let name = object.name().to_string();
        if keep.contains(&name) {
            continue;
        }
        info!("Deleting {} {}/{} (node removed from fleet)", kind, namespace, name);
        match store.delete(kind, namespace, &name).await {
            Ok(()) | Err(StoreError::NotFound(_)) => deleted.push((kind, name)),
            Err(e) => {
                error!("Failed to delete {} {}/{}: {}", kind, namespace, name, e);
                failures.push((kind, format!("delete {} failed: {}", name, e)));
            }
        }
    }
    (deleted, failures)
}
