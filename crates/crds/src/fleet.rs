//! Fleet CRD
//!
//! An ordered set of peer-to-peer nodes reconciled into cluster workloads.
//! Node order is significant: earlier bootnodes are handed to later nodes
//! as bootstrap peers.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::genesis::{ConsensusAlgorithm, Genesis};
use crate::node::Node;

/// Default topology key used to spread highly available fleets.
pub const DEFAULT_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "peerfleet.io",
    version = "v1alpha1",
    kind = "Fleet",
    namespaced,
    status = "FleetStatus",
    shortname = "fl",
    printcolumn = r#"{"name":"Nodes", "type":"integer", "jsonPath":".status.nodesCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FleetSpec {
    /// Custom genesis block; when absent the fleet joins a public network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis: Option<Genesis>,

    /// Consensus engine used when rendering the genesis block
    #[serde(default)]
    pub consensus: ConsensusAlgorithm,

    /// Public network to join when no genesis is given (e.g. "goerli")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,

    /// Network id override (defaults to the genesis chain id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u64>,

    /// Spread fleet nodes across failure domains
    #[serde(default)]
    pub highly_available: bool,

    /// Topology key used by the anti-affinity rule
    #[serde(default = "default_topology_key")]
    pub topology_key: String,

    /// Fleet nodes, in bootstrap precedence order
    #[serde(default)]
    pub nodes: Vec<Node>,
}

fn default_topology_key() -> String {
    DEFAULT_TOPOLOGY_KEY.to_string()
}

impl FleetSpec {
    /// Network id handed to clients: explicit override, then genesis chain id.
    pub fn effective_network_id(&self) -> Option<u64> {
        self.network_id
            .or_else(|| self.genesis.as_ref().map(|g| g.chain_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    /// Number of nodes in the fleet spec
    #[serde(default)]
    pub nodes_count: u32,
}
