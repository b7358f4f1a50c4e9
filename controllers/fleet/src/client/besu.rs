//! Hyperledger Besu strategy

use super::{
    ClientStrategy, GENESIS_FILE, NODEKEY_FILE, PATH_CONFIG, PATH_SECRETS, enode_url, ethereum_identity,
    ethereum_service_ports, genesis, strings,
};
use crate::error::ControllerError;
use crds::{ConsensusAlgorithm, FleetSpec, Genesis, Node, SyncMode, VerbosityLevel};
use k8s_openapi::api::core::v1::ServicePort;
use serde_json::json;

const PATH_DATA: &str = "/opt/besu/data";

#[derive(Debug, Clone)]
pub struct Besu {
    image: String,
}

impl Besu {
    pub fn new(image: String) -> Self {
        Self { image }
    }
}

impl ClientStrategy for Besu {
    fn name(&self) -> &'static str {
        "besu"
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn command(&self) -> Vec<String> {
        strings(&["besu"])
    }

    fn args(&self, fleet: &FleetSpec, node: &Node, peers: &[String]) -> Vec<String> {
        let mut args = vec!["--data-path".to_string(), PATH_DATA.to_string()];

        if node.nodekey.is_some() {
            args.push("--node-private-key-file".into());
            args.push(format!("{}/{}", PATH_SECRETS, NODEKEY_FILE));
        }

        if fleet.genesis.is_some() {
            args.push("--genesis-file".into());
            args.push(format!("{}/{}", PATH_CONFIG, GENESIS_FILE));
            if let Some(id) = fleet.effective_network_id() {
                args.push("--network-id".into());
                args.push(id.to_string());
            }
        } else if let Some(network) = &fleet.join {
            args.push("--network".into());
            args.push(network.clone());
            if let Some(id) = fleet.network_id {
                args.push("--network-id".into());
                args.push(id.to_string());
            }
        }

        if !peers.is_empty() {
            args.push("--bootnodes".into());
            args.push(peers.join(","));
        }

        args.push("--p2p-port".into());
        args.push(node.p2p_port.to_string());

        // besu has no light client; light nodes sync fast
        let sync_mode = match node.sync_mode {
            SyncMode::Full => "FULL",
            SyncMode::Fast | SyncMode::Light => "FAST",
        };
        args.push("--sync-mode".into());
        args.push(sync_mode.into());

        args.push("--logging".into());
        args.push(self.logging_flag(node.logging));

        if node.rpc {
            args.push("--rpc-http-enabled".into());
            args.push("--rpc-http-host".into());
            args.push("0.0.0.0".into());
            args.push("--rpc-http-port".into());
            args.push(node.rpc_port.to_string());
            if !node.rpc_api.is_empty() {
                let apis: Vec<String> = node.rpc_api.iter().map(|a| a.to_ascii_uppercase()).collect();
                args.push("--rpc-http-api".into());
                args.push(apis.join(","));
            }
        }

        if node.miner {
            args.push("--miner-enabled".into());
            if let Some(coinbase) = &node.coinbase {
                args.push("--miner-coinbase".into());
                args.push(coinbase.clone());
            }
        }

        args
    }

    fn logging_flag(&self, level: VerbosityLevel) -> String {
        match level {
            VerbosityLevel::Off => "OFF",
            VerbosityLevel::Fatal => "FATAL",
            VerbosityLevel::Error => "ERROR",
            VerbosityLevel::Warn => "WARN",
            VerbosityLevel::Info => "INFO",
            VerbosityLevel::Debug => "DEBUG",
            VerbosityLevel::Trace => "TRACE",
            VerbosityLevel::All => "ALL",
        }
        .to_string()
    }

    fn data_path(&self) -> &'static str {
        PATH_DATA
    }

    fn renders_genesis(&self) -> bool {
        true
    }

    fn render_genesis(
        &self,
        genesis: &Genesis,
        consensus: ConsensusAlgorithm,
    ) -> Result<String, ControllerError> {
        let mut config = genesis::fork_blocks(genesis.chain_id, &genesis.forks);
        let extra_data = match consensus {
            ConsensusAlgorithm::Pow => {
                let ethash = match genesis.ethash.as_ref().and_then(|e| e.fixed_difficulty) {
                    Some(difficulty) => json!({ "fixeddifficulty": difficulty }),
                    None => json!({}),
                };
                config.insert("ethash".into(), ethash);
                "0x00".to_string()
            }
            ConsensusAlgorithm::Poa => {
                let clique = genesis.clique.as_ref().ok_or_else(|| {
                    ControllerError::GenesisRenderError("poa consensus requires clique parameters".to_string())
                })?;
                config.insert(
                    "clique".into(),
                    json!({
                        "blockperiodseconds": clique.block_period,
                        "epochlength": clique.epoch_length,
                    }),
                );
                genesis::clique_extra_data(&clique.signers)?
            }
            ConsensusAlgorithm::Ibft2 => {
                let ibft2 = genesis.ibft2.as_ref().ok_or_else(|| {
                    ControllerError::GenesisRenderError("ibft2 consensus requires ibft2 parameters".to_string())
                })?;
                config.insert(
                    "ibft2".into(),
                    json!({
                        "blockperiodseconds": ibft2.block_period,
                        "epochlength": ibft2.epoch_length,
                        "requesttimeoutseconds": ibft2.request_timeout,
                    }),
                );
                genesis::ibft2_extra_data(&ibft2.validators)?
            }
        };
        genesis::document(genesis, config, &extra_data)
    }

    fn service_ports(&self, node: &Node) -> Vec<ServicePort> {
        ethereum_service_ports(node)
    }

    fn public_identity(&self, node: &Node) -> Result<String, ControllerError> {
        ethereum_identity(node)
    }

    fn peer_address(&self, identity: &str, ip: &str, node: &Node) -> String {
        enode_url(identity, ip, node.p2p_port)
    }
}
