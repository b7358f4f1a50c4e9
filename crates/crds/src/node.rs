//! Fleet node types

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single peer in a fleet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node name, unique within the fleet
    pub name: String,

    /// Client software family ("geth", "besu", "go-ipfs")
    pub client: String,

    /// Compute and storage quotas
    #[serde(default)]
    pub resources: NodeResources,

    /// Peer-to-peer port
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,

    /// Whether later nodes use this node for bootstrap/peer discovery
    #[serde(default)]
    pub bootnode: bool,

    /// Hex encoded secp256k1 private key ("0x" prefix optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodekey: Option<String>,

    /// Account to import into the client keystore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportedAccount>,

    /// IPFS peer identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,

    /// IPFS base64 private key matching `peer_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// IPFS configuration profiles applied after init, in order
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Blockchain sync mode
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Enable the HTTP JSON-RPC server
    #[serde(default)]
    pub rpc: bool,

    /// HTTP JSON-RPC port
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// HTTP JSON-RPC APIs
    #[serde(default = "default_rpc_api")]
    pub rpc_api: Vec<String>,

    /// Enable block production
    #[serde(default)]
    pub miner: bool,

    /// Block reward recipient when mining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase: Option<String>,

    /// Client log verbosity
    #[serde(default)]
    pub logging: VerbosityLevel,
}

fn default_p2p_port() -> u16 {
    30303
}

fn default_rpc_port() -> u16 {
    8545
}

fn default_rpc_api() -> Vec<String> {
    vec!["web3".to_string(), "net".to_string(), "eth".to_string()]
}

impl Node {
    /// Node carries material that has to be stored as a secret.
    pub fn needs_secret(&self) -> bool {
        self.nodekey.is_some() || self.import.is_some() || self.private_key.is_some()
    }
}

/// Account imported into the node keystore.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportedAccount {
    /// Hex encoded account private key
    pub private_key: String,

    /// Password used to lock the imported account
    pub password: String,
}

/// Node compute and storage quotas.
///
/// Quantities use Kubernetes notation ("500m", "2Gi").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeResources {
    #[serde(default = "default_cpu")]
    pub cpu: String,

    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,

    #[serde(default = "default_memory")]
    pub memory: String,

    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    #[serde(default = "default_storage")]
    pub storage: String,

    /// Storage class; cluster default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

fn default_cpu() -> String {
    "2".to_string()
}

fn default_cpu_limit() -> String {
    "3".to_string()
}

fn default_memory() -> String {
    "4Gi".to_string()
}

fn default_memory_limit() -> String {
    "6Gi".to_string()
}

fn default_storage() -> String {
    "100Gi".to_string()
}

impl Default for NodeResources {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            cpu_limit: default_cpu_limit(),
            memory: default_memory(),
            memory_limit: default_memory_limit(),
            storage: default_storage(),
            storage_class: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Fast,
    Full,
    Light,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Fast => "fast",
            SyncMode::Full => "full",
            SyncMode::Light => "light",
        }
    }
}

/// Abstract log verbosity, mapped to each client's native flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerbosityLevel {
    Off,
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    All,
}
