//! Node resource planner.
//!
//! Derives the desired PVC, ConfigMap, Secret, Service and Deployment of one
//! node from the fleet, the node and the peers collected before it. Pure: the
//! planner never talks to the cluster, so an invalid node fails before any of
//! its resources are written.

use super::naming::{node_labels, resource_name};
use crate::client::{
    ACCOUNT_KEY_FILE, ACCOUNT_PASSWORD_FILE, ClientStrategy, GENESIS_FILE, IMPORT_ACCOUNT_SCRIPT,
    INIT_GENESIS_SCRIPT, IPFS_PRIVATE_KEY_FILE, NODEKEY_FILE, PATH_CONFIG, PATH_SECRETS,
};
use crate::error::ControllerError;
use crate::keys;
use cluster_store::{ChildResource, ResourceKind};
use crds::{Fleet, FleetSpec, Node};
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapVolumeSource, Container, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodAffinityTerm, PodAntiAffinity,
    PodSpec, PodTemplateSpec, ResourceRequirements, Secret, SecretVolumeSource, Service, ServiceSpec,
    Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;

const VOLUME_DATA: &str = "data";
const VOLUME_CONFIG: &str = "config";
const VOLUME_SECRETS: &str = "secrets";

/// File mode applied by the API server when none is given (0644)
const DEFAULT_FILE_MODE: i32 = 0o644;

/// Desired state of every resource derived for one node.
#[derive(Debug, Clone)]
pub struct DerivedResourceSet {
    pub node: String,
    pub volume: PersistentVolumeClaim,
    pub config: Option<ConfigMap>,
    pub secret: Option<Secret>,
    pub endpoint: Option<Service>,
    pub workload: Deployment,
    /// Public identity, resolved for bootnodes only
    pub identity: Option<String>,
}

impl DerivedResourceSet {
    /// Resources in apply order: volume, config, secret, endpoint, workload.
    pub fn into_resources(self) -> Vec<ChildResource> {
        let mut resources = vec![ChildResource::Volume(self.volume)];
        resources.extend(self.config.map(ChildResource::Config));
        resources.extend(self.secret.map(ChildResource::Secret));
        resources.extend(self.endpoint.map(ChildResource::Endpoint));
        resources.push(ChildResource::Workload(self.workload));
        resources
    }
}

/// Whether the node gets a ConfigMap: the fleet has a genesis the family
/// renders, or the node imports an account through a family import script.
pub fn wants_config(strategy: &dyn ClientStrategy, spec: &FleetSpec, node: &Node) -> bool {
    (spec.genesis.is_some() && strategy.renders_genesis())
        || (node.import.is_some() && strategy.import_account_script().is_some())
}

/// Derive every resource of `node` with the family `strategy`. `peers` are
/// the addresses of the bootnodes preceding it.
pub fn plan_node(
    strategy: &dyn ClientStrategy,
    fleet: &Fleet,
    node: &Node,
    peers: &[String],
) -> Result<DerivedResourceSet, ControllerError> {
    let fleet_name = fleet.name_any();
    let namespace = fleet.namespace();
    let spec = &fleet.spec;
    let labels = node_labels(&fleet_name, &node.name);

    let meta = |kind: ResourceKind| ObjectMeta {
        name: Some(resource_name(&fleet_name, node, kind)),
        namespace: namespace.clone(),
        labels: Some(labels.clone()),
        ..Default::default()
    };

    let identity = if node.bootnode {
        Some(strategy.public_identity(node)?)
    } else {
        None
    };

    let secret = if node.needs_secret() {
        Some(Secret {
            metadata: meta(ResourceKind::Secret),
            data: Some(secret_data(node)?),
            ..Default::default()
        })
    } else {
        None
    };

    let config = if wants_config(strategy, spec, node) {
        Some(ConfigMap {
            metadata: meta(ResourceKind::Config),
            data: Some(config_data(strategy, spec, node)?),
            ..Default::default()
        })
    } else {
        None
    };

    let endpoint = node.bootnode.then(|| Service {
        metadata: meta(ResourceKind::Endpoint),
        spec: Some(ServiceSpec {
            ports: Some(strategy.service_ports(node)),
            selector: Some(labels.clone()),
            ..Default::default()
        }),
        ..Default::default()
    });

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    if let Some(secret) = &secret {
        volumes.push(Volume {
            name: VOLUME_SECRETS.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: secret.metadata.name.clone(),
                default_mode: Some(DEFAULT_FILE_MODE),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: VOLUME_SECRETS.to_string(),
            mount_path: PATH_SECRETS.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    if let Some(config) = &config {
        volumes.push(Volume {
            name: VOLUME_CONFIG.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config.metadata.name.clone().unwrap_or_default(),
                default_mode: Some(DEFAULT_FILE_MODE),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: VOLUME_CONFIG.to_string(),
            mount_path: PATH_CONFIG.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    volumes.push(Volume {
        name: VOLUME_DATA.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: resource_name(&fleet_name, node, ResourceKind::Volume),
            ..Default::default()
        }),
        ..Default::default()
    });
    mounts.push(VolumeMount {
        name: VOLUME_DATA.to_string(),
        mount_path: strategy.data_path().to_string(),
        ..Default::default()
    });

    let config_entries = config.as_ref().and_then(|c| c.data.as_ref());
    let has_entry = |key: &str| config_entries.is_some_and(|d| d.contains_key(key));

    let mut init_containers = Vec::new();
    if has_entry(INIT_GENESIS_SCRIPT) {
        init_containers.push(script_container(strategy, "init-genesis", INIT_GENESIS_SCRIPT, &mounts));
    }
    if has_entry(IMPORT_ACCOUNT_SCRIPT) {
        init_containers.push(script_container(strategy, "import-account", IMPORT_ACCOUNT_SCRIPT, &mounts));
    }
    init_containers.extend(strategy.post_init_containers(node, peers, &mounts));

    let env = strategy.env(node);
    let node_container = Container {
        name: "node".to_string(),
        image: Some(strategy.image().to_string()),
        command: Some(strategy.command()),
        args: Some(strategy.args(spec, node, peers)),
        env: (!env.is_empty()).then_some(env),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(node.resources.cpu.clone())),
                ("memory".to_string(), Quantity(node.resources.memory.clone())),
            ])),
            limits: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(node.resources.cpu_limit.clone())),
                ("memory".to_string(), Quantity(node.resources.memory_limit.clone())),
            ])),
            ..Default::default()
        }),
        volume_mounts: Some(mounts),
        ..Default::default()
    };

    let workload = Deployment {
        metadata: meta(ResourceKind::Workload),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: (!init_containers.is_empty()).then_some(init_containers),
                    containers: vec![node_container],
                    volumes: Some(volumes),
                    affinity: affinity(&fleet_name, spec),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let volume = PersistentVolumeClaim {
        metadata: meta(ResourceKind::Volume),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(node.resources.storage.clone()),
                )])),
                ..Default::default()
            }),
            storage_class_name: node.resources.storage_class.clone(),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(DerivedResourceSet {
        node: node.name.clone(),
        volume,
        config,
        secret,
        endpoint,
        workload,
        identity,
    })
}

fn secret_data(node: &Node) -> Result<BTreeMap<String, ByteString>, ControllerError> {
    let mut data = BTreeMap::new();
    if let Some(nodekey) = &node.nodekey {
        let digits = keys::validate_private_key(nodekey)?;
        data.insert(NODEKEY_FILE.to_string(), ByteString(digits.into_bytes()));
    }
    if let Some(import) = &node.import {
        let digits = keys::validate_private_key(&import.private_key)?;
        data.insert(ACCOUNT_KEY_FILE.to_string(), ByteString(digits.into_bytes()));
        data.insert(
            ACCOUNT_PASSWORD_FILE.to_string(),
            ByteString(import.password.clone().into_bytes()),
        );
    }
    if let Some(private_key) = &node.private_key {
        let private_key = private_key.trim();
        if private_key.is_empty() {
            return Err(ControllerError::InvalidKeyMaterial(format!(
                "node {} has an empty private key",
                node.name
            )));
        }
        data.insert(
            IPFS_PRIVATE_KEY_FILE.to_string(),
            ByteString(private_key.as_bytes().to_vec()),
        );
    }
    Ok(data)
}

fn config_data(
    strategy: &dyn ClientStrategy,
    spec: &FleetSpec,
    node: &Node,
) -> Result<BTreeMap<String, String>, ControllerError> {
    let mut data = BTreeMap::new();
    if let Some(genesis) = spec.genesis.as_ref().filter(|_| strategy.renders_genesis()) {
        data.insert(GENESIS_FILE.to_string(), strategy.render_genesis(genesis, spec.consensus)?);
        if let Some(script) = strategy.init_genesis_script() {
            data.insert(INIT_GENESIS_SCRIPT.to_string(), script);
        }
    }
    if node.import.is_some() {
        if let Some(script) = strategy.import_account_script() {
            data.insert(IMPORT_ACCOUNT_SCRIPT.to_string(), script);
        }
    }
    Ok(data)
}

fn script_container(strategy: &dyn ClientStrategy, name: &str, script: &str, mounts: &[VolumeMount]) -> Container {
    Container {
        name: name.to_string(),
        image: Some(strategy.image().to_string()),
        command: Some(vec!["/bin/sh".to_string()]),
        args: Some(vec![format!("{}/{}", PATH_CONFIG, script)]),
        volume_mounts: Some(mounts.to_vec()),
        ..Default::default()
    }
}

/// Required pod anti-affinity spreading the fleet across `topologyKey`.
fn affinity(fleet_name: &str, spec: &FleetSpec) -> Option<Affinity> {
    if !spec.highly_available {
        return None;
    }
    Some(Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_labels: Some(super::naming::fleet_labels(fleet_name)),
                    ..Default::default()
                }),
                topology_key: if spec.topology_key.is_empty() {
                    crds::DEFAULT_TOPOLOGY_KEY.to_string()
                } else {
                    spec.topology_key.clone()
                },
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

