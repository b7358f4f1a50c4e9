//! Client software strategies.
//!
//! Every supported node family implements [`ClientStrategy`]. The planner
//! selects one per node with [`strategy_for`] and never branches on the family
//! name itself.

pub mod besu;
pub mod genesis;
pub mod geth;
pub mod ipfs;

use crate::config::{DEFAULT_BESU_IMAGE, DEFAULT_GETH_IMAGE, DEFAULT_IPFS_IMAGE};
use crate::error::ControllerError;
use crate::keys;
use crds::{ConsensusAlgorithm, FleetSpec, Genesis, Node, VerbosityLevel};
use k8s_openapi::api::core::v1::{Container, EnvVar, ServicePort, VolumeMount};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Mount point of the node ConfigMap
pub const PATH_CONFIG: &str = "/mnt/config";
/// Mount point of the node Secret
pub const PATH_SECRETS: &str = "/mnt/secrets";

pub const GENESIS_FILE: &str = "genesis.json";
pub const INIT_GENESIS_SCRIPT: &str = "init-genesis.sh";
pub const IMPORT_ACCOUNT_SCRIPT: &str = "import-account.sh";

pub const NODEKEY_FILE: &str = "nodekey";
pub const ACCOUNT_KEY_FILE: &str = "account.key";
pub const ACCOUNT_PASSWORD_FILE: &str = "account.password";
pub const IPFS_PRIVATE_KEY_FILE: &str = "ipfs.key";

/// Container images per client family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Images {
    pub geth: String,
    pub besu: String,
    pub ipfs: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            geth: DEFAULT_GETH_IMAGE.to_string(),
            besu: DEFAULT_BESU_IMAGE.to_string(),
            ipfs: DEFAULT_IPFS_IMAGE.to_string(),
        }
    }
}

/// Capabilities of one client software family.
pub trait ClientStrategy: Send + Sync {
    /// Family name as written in the node spec
    fn name(&self) -> &'static str;

    fn image(&self) -> &str;

    /// Entrypoint of the main container
    fn command(&self) -> Vec<String>;

    /// Arguments of the main container. `peers` holds the addresses of the
    /// bootnodes that precede this node.
    fn args(&self, fleet: &FleetSpec, node: &Node, peers: &[String]) -> Vec<String>;

    /// Environment of the main container
    fn env(&self, _node: &Node) -> Vec<EnvVar> {
        Vec::new()
    }

    /// Native value for an abstract verbosity level
    fn logging_flag(&self, level: VerbosityLevel) -> String;

    /// Where the data volume is mounted
    fn data_path(&self) -> &'static str;

    /// Whether the family consumes a genesis document at all
    fn renders_genesis(&self) -> bool {
        false
    }

    /// Render the genesis document in the family's format
    fn render_genesis(
        &self,
        _genesis: &Genesis,
        _consensus: ConsensusAlgorithm,
    ) -> Result<String, ControllerError> {
        Err(ControllerError::GenesisRenderError(format!(
            "{} does not use a genesis block",
            self.name()
        )))
    }

    /// Script initializing the data directory from genesis, if the family needs one
    fn init_genesis_script(&self) -> Option<String> {
        None
    }

    /// Script importing the node account, if the family supports it
    fn import_account_script(&self) -> Option<String> {
        None
    }

    /// Ports exposed by the node Service
    fn service_ports(&self, node: &Node) -> Vec<ServicePort>;

    /// Init containers appended after the genesis and import containers
    fn post_init_containers(
        &self,
        _node: &Node,
        _peers: &[String],
        _mounts: &[VolumeMount],
    ) -> Vec<Container> {
        Vec::new()
    }

    /// Public identity other nodes use to reach this node
    fn public_identity(&self, node: &Node) -> Result<String, ControllerError>;

    /// Bootstrap address handed to later nodes
    fn peer_address(&self, identity: &str, ip: &str, node: &Node) -> String;
}

/// Select the strategy for a node's `client` field.
pub fn strategy_for(client: &str, images: &Images) -> Result<Box<dyn ClientStrategy>, ControllerError> {
    match client {
        "geth" => Ok(Box::new(geth::Geth::new(images.geth.clone()))),
        "besu" => Ok(Box::new(besu::Besu::new(images.besu.clone()))),
        "go-ipfs" => Ok(Box::new(ipfs::GoIpfs::new(images.ipfs.clone()))),
        other => Err(ControllerError::UnsupportedSoftwareFamily(other.to_string())),
    }
}

pub(crate) fn service_port(name: &str, port: u16, protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port: i32::from(port),
        target_port: Some(IntOrString::Int(i32::from(port))),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

/// Ports shared by Ethereum clients: devp2p over UDP and TCP, plus JSON-RPC.
pub(crate) fn ethereum_service_ports(node: &Node) -> Vec<ServicePort> {
    let mut ports = vec![
        service_port("discovery", node.p2p_port, "UDP"),
        service_port("p2p", node.p2p_port, "TCP"),
    ];
    if node.rpc {
        ports.push(service_port("json-rpc", node.rpc_port, "TCP"));
    }
    ports
}

/// Enode identity from the node key.
pub(crate) fn ethereum_identity(node: &Node) -> Result<String, ControllerError> {
    match &node.nodekey {
        Some(nodekey) => keys::derive_public_key(nodekey),
        None => Err(ControllerError::UnresolvedPeerAddress(format!(
            "node {} has no nodekey to derive an enode identity from",
            node.name
        ))),
    }
}

pub(crate) fn enode_url(public_key: &str, ip: &str, port: u16) -> String {
    format!("enode://{}@{}:{}", public_key, ip, port)
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_for_known_families() {
        let images = Images::default();
        for name in ["geth", "besu", "go-ipfs"] {
            let strategy = strategy_for(name, &images).unwrap();
            assert_eq!(strategy.name(), name);
        }
    }

    #[test]
    fn test_strategy_for_unknown_family() {
        let err = strategy_for("parity", &Images::default()).err().unwrap();
        assert!(matches!(err, ControllerError::UnsupportedSoftwareFamily(ref c) if c == "parity"));
    }

    #[test]
    fn test_strategy_uses_configured_image() {
        let images = Images {
            besu: "registry.local/besu:edge".to_string(),
            ..Images::default()
        };
        let strategy = strategy_for("besu", &images).unwrap();
        assert_eq!(strategy.image(), "registry.local/besu:edge");
    }

    #[test]
    fn test_ethereum_ports_include_rpc_when_enabled() {
        let mut node = Node {
            name: "n".into(),
            client: "geth".into(),
            p2p_port: 30305,
            ..Default::default()
        };
        let ports = ethereum_service_ports(&node);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].protocol.as_deref(), Some("UDP"));
        assert_eq!(ports[1].port, 30305);

        node.rpc = true;
        node.rpc_port = 8547;
        let ports = ethereum_service_ports(&node);
        assert_eq!(ports[2].name.as_deref(), Some("json-rpc"));
        assert_eq!(ports[2].port, 8547);
    }
}
