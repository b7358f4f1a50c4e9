//! Deterministic names and labels of derived resources.

use cluster_store::ResourceKind;
use crds::Node;
use std::collections::BTreeMap;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_FLEET: &str = "peerfleet.io/fleet";

pub const MANAGER: &str = "peerfleet";
const NODE_APP: &str = "node";

/// Name of the resource of `kind` derived for `node`.
pub fn resource_name(fleet: &str, node: &Node, kind: ResourceKind) -> String {
    match kind {
        ResourceKind::Config => format!("{}-{}-{}", fleet, node.name, node.client),
        _ => format!("{}-{}", fleet, node.name),
    }
}

/// Labels shared by every resource of a fleet; used as the GC list selector.
pub fn fleet_labels(fleet: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), NODE_APP.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGER.to_string()),
        (LABEL_FLEET.to_string(), fleet.to_string()),
    ])
}

/// Labels of a single node's resources and pods.
pub fn node_labels(fleet: &str, node: &str) -> BTreeMap<String, String> {
    let mut labels = fleet_labels(fleet);
    labels.insert(LABEL_INSTANCE.to_string(), node.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, client: &str) -> Node {
        Node {
            name: name.into(),
            client: client.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_names() {
        let n = node("node-1", "geth");
        assert_eq!(resource_name("demo", &n, ResourceKind::Volume), "demo-node-1");
        assert_eq!(resource_name("demo", &n, ResourceKind::Secret), "demo-node-1");
        assert_eq!(resource_name("demo", &n, ResourceKind::Endpoint), "demo-node-1");
        assert_eq!(resource_name("demo", &n, ResourceKind::Workload), "demo-node-1");
        assert_eq!(resource_name("demo", &n, ResourceKind::Config), "demo-node-1-geth");
    }

    #[test]
    fn test_node_labels_extend_fleet_labels() {
        let labels = node_labels("demo", "node-1");
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[LABEL_INSTANCE], "node-1");
        for (k, v) in fleet_labels("demo") {
            assert_eq!(labels.get(&k), Some(&v));
        }
    }
}
