//! Child resource kinds owned by a fleet

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;

/// The kinds of resource derived for every fleet node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// PersistentVolumeClaim holding node data
    Volume,
    /// ConfigMap with genesis and init scripts
    Config,
    /// Secret with key material
    Secret,
    /// Service exposing the p2p port
    Endpoint,
    /// Deployment running the node
    Workload,
}

impl ResourceKind {
    /// Every kind a fleet can own, in creation order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Volume,
        ResourceKind::Config,
        ResourceKind::Secret,
        ResourceKind::Endpoint,
        ResourceKind::Workload,
    ];

    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "PersistentVolumeClaim",
            ResourceKind::Config => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Endpoint => "Service",
            ResourceKind::Workload => "Deployment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed child resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildResource {
    Volume(PersistentVolumeClaim),
    Config(ConfigMap),
    Secret(Secret),
    Endpoint(Service),
    Workload(Deployment),
}

impl ChildResource {
    /// An empty object of `kind` carrying only its name and namespace.
    pub fn empty(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        let metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        };
        match kind {
            ResourceKind::Volume => ChildResource::Volume(PersistentVolumeClaim {
                metadata,
                ..Default::default()
            }),
            ResourceKind::Config => ChildResource::Config(ConfigMap {
                metadata,
                ..Default::default()
            }),
            ResourceKind::Secret => ChildResource::Secret(Secret {
                metadata,
                ..Default::default()
            }),
            ResourceKind::Endpoint => ChildResource::Endpoint(Service {
                metadata,
                ..Default::default()
            }),
            ResourceKind::Workload => ChildResource::Workload(Deployment {
                metadata,
                ..Default::default()
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ChildResource::Volume(_) => ResourceKind::Volume,
            ChildResource::Config(_) => ResourceKind::Config,
            ChildResource::Secret(_) => ResourceKind::Secret,
            ChildResource::Endpoint(_) => ResourceKind::Endpoint,
            ChildResource::Workload(_) => ResourceKind::Workload,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildResource::Volume(o) => &o.metadata,
            ChildResource::Config(o) => &o.metadata,
            ChildResource::Secret(o) => &o.metadata,
            ChildResource::Endpoint(o) => &o.metadata,
            ChildResource::Workload(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ChildResource::Volume(o) => &mut o.metadata,
            ChildResource::Config(o) => &mut o.metadata,
            ChildResource::Secret(o) => &mut o.metadata,
            ChildResource::Endpoint(o) => &mut o.metadata,
            ChildResource::Workload(o) => &mut o.metadata,
        }
    }

    /// Object name (empty if unset)
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Labels, created on first access
    pub fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata_mut().labels.get_or_insert_with(BTreeMap::new)
    }

    /// Whether the object has been persisted by the store.
    ///
    /// The store assigns a uid on creation, so a missing uid marks an object
    /// that only exists locally.
    pub fn is_persisted(&self) -> bool {
        self.metadata().uid.is_some()
    }

    /// Label subset match used by list selectors
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        let labels = self.metadata().labels.as_ref();
        selector
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }
}
