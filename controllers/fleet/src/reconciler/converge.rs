//! Convergence executor.
//!
//! Applies one derived resource: creates it with a controller owner reference
//! to the fleet, or merges the fields this controller owns into the live
//! object. Fields set by other actors (API server defaults, other
//! controllers, users) are left alone, so re-applying an unchanged spec never
//! writes.
//!
//! An object already controlled by a different owner is never adopted: two
//! fleets whose `{fleet}-{node}` names collide in one namespace fail with a
//! conflict instead of taking turns rewriting the same objects.

use super::quantity::same_requirements;
use crate::error::ControllerError;
use cluster_store::{ChildResource, ClusterStore, OperationResult, StoreError, create_or_update};
use crds::Fleet;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Converge `desired` against the live cluster, returning the stored object.
pub async fn converge(
    store: &dyn ClusterStore,
    fleet: &Fleet,
    desired: ChildResource,
) -> Result<ChildResource, ControllerError> {
    let namespace = fleet
        .namespace()
        .ok_or_else(|| ControllerError::InvalidConfig(format!("fleet {} has no namespace", fleet.name_any())))?;
    let owner = fleet.controller_owner_ref(&());
    let kind = desired.kind();
    let name = desired.name().to_string();

    let mut foreign_controller = None;
    let (result, object) = create_or_update(store, kind, &namespace, &name, |live| {
        match foreign_controller_of(live, owner.as_ref()) {
            Some(other) => foreign_controller = Some(other),
            None => merge(live, &desired, owner.as_ref()),
        }
    })
    .await?;

    if let Some(other) = foreign_controller {
        return Err(ControllerError::Store(StoreError::Conflict(format!(
            "{} {}/{} is controlled by {}, not fleet {}",
            kind,
            namespace,
            name,
            other,
            fleet.name_any()
        ))));
    }

    match result {
        OperationResult::Unchanged => debug!("{} {}/{} is up to date", kind, namespace, name),
        result => info!("{} {}/{} {}", kind, namespace, name, result),
    }
    Ok(object)
}

/// `kind/name` of the controller owning `live` when it is not `owner`.
fn foreign_controller_of(live: &ChildResource, owner: Option<&OwnerReference>) -> Option<String> {
    let owner = owner?;
    live.metadata()
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
        .map(|r| format!("{} {}", r.kind, r.name))
}

/// Merge the owned fields of `desired` into `live`.
pub fn merge(live: &mut ChildResource, desired: &ChildResource, owner: Option<&OwnerReference>) {
    let persisted = live.is_persisted();
    merge_metadata(live.metadata_mut(), desired.metadata(), owner);

    match (live, desired) {
        (ChildResource::Volume(live), ChildResource::Volume(desired)) => {
            // storage backends don't resize in place; the claim spec is fixed at creation
            if !persisted {
                live.spec = desired.spec.clone();
            }
        }
        (ChildResource::Config(live), ChildResource::Config(desired)) => {
            live.data = desired.data.clone();
        }
        (ChildResource::Secret(live), ChildResource::Secret(desired)) => {
            live.data = desired.data.clone();
        }
        (ChildResource::Endpoint(live), ChildResource::Endpoint(desired)) => merge_service(live, desired),
        (ChildResource::Workload(live), ChildResource::Workload(desired)) => merge_deployment(live, desired),
        // kind mismatches are rejected by create_or_update
        _ => {}
    }
}

fn merge_metadata(live: &mut ObjectMeta, desired: &ObjectMeta, owner: Option<&OwnerReference>) {
    if let Some(labels) = &desired.labels {
        live.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(owner) = owner {
        let refs = live.owner_references.get_or_insert_with(Vec::new);
        if !refs.iter().any(|r| r.uid == owner.uid) {
            refs.push(owner.clone());
        }
    }
}

fn merge_service(live: &mut Service, desired: &Service) {
    let Some(desired_spec) = &desired.spec else {
        return;
    };
    // cluster IP and other allocated fields stay as the API server set them
    let spec = live.spec.get_or_insert_with(Default::default);
    spec.ports = desired_spec.ports.clone();
    spec.selector = desired_spec.selector.clone();
}

fn merge_deployment(live: &mut Deployment, desired: &Deployment) {
    let Some(desired_spec) = &desired.spec else {
        return;
    };
    let spec = live.spec.get_or_insert_with(Default::default);

    // the selector is immutable once set
    if spec.selector.match_labels.is_none() && spec.selector.match_expressions.is_none() {
        spec.selector = desired_spec.selector.clone();
    }

    let desired_template = &desired_spec.template;
    if let Some(labels) = desired_template.metadata.as_ref().and_then(|m| m.labels.as_ref()) {
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let Some(desired_pod) = &desired_template.spec else {
        return;
    };
    let pod = spec.template.spec.get_or_insert_with(Default::default);
    pod.containers = merge_containers(&pod.containers, &desired_pod.containers);
    pod.init_containers = desired_pod
        .init_containers
        .as_ref()
        .map(|desired| merge_containers(pod.init_containers.as_deref().unwrap_or_default(), desired));
    pod.volumes = desired_pod.volumes.clone();
    pod.affinity = desired_pod.affinity.clone();
}

/// Containers in desired order; a live container with the same name keeps
/// its defaulted fields and takes the owned ones from `desired`. Resources
/// are compared by amount, since the API server returns them canonicalized.
fn merge_containers(live: &[Container], desired: &[Container]) -> Vec<Container> {
    desired
        .iter()
        .map(|wanted| match live.iter().find(|c| c.name == wanted.name) {
            Some(current) => {
                let mut merged = current.clone();
                merged.image = wanted.image.clone();
                merged.command = wanted.command.clone();
                merged.args = wanted.args.clone();
                merged.env = wanted.env.clone();
                if !same_requirements(current.resources.as_ref(), wanted.resources.as_ref()) {
                    merged.resources = wanted.resources.clone();
                }
                merged.volume_mounts = wanted.volume_mounts.clone();
                merged
            }
            None => wanted.clone(),
        })
        .collect()
}
