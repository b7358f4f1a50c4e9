//! Go Ethereum strategy

use super::{
    ClientStrategy, ACCOUNT_KEY_FILE, ACCOUNT_PASSWORD_FILE, GENESIS_FILE, NODEKEY_FILE, PATH_CONFIG,
    PATH_SECRETS, enode_url, ethereum_identity, ethereum_service_ports, genesis, strings,
};
use crate::error::ControllerError;
use crds::{ConsensusAlgorithm, FleetSpec, Genesis, Node, VerbosityLevel};
use k8s_openapi::api::core::v1::ServicePort;
use serde_json::json;

const PATH_DATA: &str = "/mnt/data";

#[derive(Debug, Clone)]
pub struct Geth {
    image: String,
}

impl Geth {
    pub fn new(image: String) -> Self {
        Self { image }
    }
}

impl ClientStrategy for Geth {
    fn name(&self) -> &'static str {
        "geth"
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn command(&self) -> Vec<String> {
        strings(&["geth"])
    }

    fn args(&self, fleet: &FleetSpec, node: &Node, peers: &[String]) -> Vec<String> {
        let mut args = strings(&["--datadir", PATH_DATA]);

        if node.nodekey.is_some() {
            args.push("--nodekey".into());
            args.push(format!("{}/{}", PATH_SECRETS, NODEKEY_FILE));
        }

        if let Some(id) = fleet.effective_network_id() {
            args.push("--networkid".into());
            args.push(id.to_string());
        }

        if fleet.genesis.is_none() {
            if let Some(network) = fleet.join.as_deref().filter(|n| *n != "mainnet") {
                args.push(format!("--{}", network));
            }
        }

        if !peers.is_empty() {
            args.push("--bootnodes".into());
            args.push(peers.join(","));
        }

        args.push("--port".into());
        args.push(node.p2p_port.to_string());

        args.push("--syncmode".into());
        args.push(node.sync_mode.as_str().to_string());

        args.push("--verbosity".into());
        args.push(self.logging_flag(node.logging));

        if node.rpc {
            args.push("--http".into());
            args.push("--http.addr".into());
            args.push("0.0.0.0".into());
            args.push("--http.port".into());
            args.push(node.rpc_port.to_string());
            if !node.rpc_api.is_empty() {
                args.push("--http.api".into());
                args.push(node.rpc_api.join(","));
            }
        }

        if node.miner {
            args.push("--mine".into());
            if let Some(coinbase) = &node.coinbase {
                args.push("--miner.etherbase".into());
                args.push(coinbase.clone());
                if node.import.is_some() {
                    args.push("--unlock".into());
                    args.push(coinbase.clone());
                    args.push("--password".into());
                    args.push(format!("{}/{}", PATH_SECRETS, ACCOUNT_PASSWORD_FILE));
                }
            }
        }

        args
    }

    fn logging_flag(&self, level: VerbosityLevel) -> String {
        let verbosity = match level {
            VerbosityLevel::Off => 0,
            VerbosityLevel::Fatal | VerbosityLevel::Error => 1,
            VerbosityLevel::Warn => 2,
            VerbosityLevel::Info => 3,
            VerbosityLevel::Debug => 4,
            VerbosityLevel::Trace | VerbosityLevel::All => 5,
        };
        verbosity.to_string()
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
                config.insert("ethash".into(), json!({}));
                "0x00".to_string()
            }
            ConsensusAlgorithm::Poa => {
                let clique = genesis.clique.as_ref().ok_or_else(|| {
                    ControllerError::GenesisRenderError("poa consensus requires clique parameters".to_string())
                })?;
                config.insert(
                    "clique".into(),
                    json!({ "period": clique.block_period, "epoch": clique.epoch_length }),
                );
                genesis::clique_extra_data(&clique.signers)?
            }
            ConsensusAlgorithm::Ibft2 => {
                return Err(ControllerError::GenesisRenderError(
                    "geth does not support ibft2 consensus".to_string(),
                ));
            }
        };
        genesis::document(genesis, config, &extra_data)
    }

    fn init_genesis_script(&self) -> Option<String> {
        Some(format!(
            r#"#!/bin/sh

set -e

if [ ! -d {data}/geth ]
then
    echo "initializing geth genesis block"
    geth init --datadir {data} {config}/{genesis}
else
    echo "genesis block has been initialized before!"
fi
"#,
            data = PATH_DATA,
            config = PATH_CONFIG,
            genesis = GENESIS_FILE,
        ))
    }

    fn import_account_script(&self) -> Option<String> {
        Some(format!(
            r#"#!/bin/sh

set -e

if [ -z "$(ls -A {data}/keystore 2>/dev/null)" ]
then
    echo "importing account"
    geth account import --datadir {data} --password {secrets}/{password} {secrets}/{key}
else
    echo "account has been imported before!"
fi
"#,
            data = PATH_DATA,
            secrets = PATH_SECRETS,
            password = ACCOUNT_PASSWORD_FILE,
            key = ACCOUNT_KEY_FILE,
        ))
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
