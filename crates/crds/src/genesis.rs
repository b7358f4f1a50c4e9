//! Genesis block definition shared by Ethereum clients.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusAlgorithm {
    /// Proof of work (ethash)
    #[default]
    Pow,
    /// Proof of authority (clique)
    Poa,
    /// Istanbul BFT 2.0
    Ibft2,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    pub chain_id: u64,

    #[serde(default = "default_coinbase")]
    pub coinbase: String,

    #[serde(default = "default_difficulty")]
    pub difficulty: String,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: String,

    #[serde(default = "default_mix_hash")]
    pub mix_hash: String,

    #[serde(default = "default_nonce")]
    pub nonce: String,

    #[serde(default = "default_timestamp")]
    pub timestamp: String,

    /// Hard fork activation blocks
    #[serde(default)]
    pub forks: Forks,

    /// Pre-funded accounts
    #[serde(default)]
    pub accounts: Vec<Account>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethash: Option<Ethash>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clique: Option<Clique>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ibft2: Option<Ibft2>,
}

fn default_coinbase() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_difficulty() -> String {
    "0x1".to_string()
}

fn default_gas_limit() -> String {
    "0x47b760".to_string()
}

fn default_mix_hash() -> String {
    "0x0000000000000000000000000000000000000000000000000000000000000000".to_string()
}

fn default_nonce() -> String {
    "0x0".to_string()
}

fn default_timestamp() -> String {
    "0x0".to_string()
}

impl Genesis {
    /// Genesis with the given chain id and defaults everywhere else.
    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            coinbase: default_coinbase(),
            difficulty: default_difficulty(),
            gas_limit: default_gas_limit(),
            mix_hash: default_mix_hash(),
            nonce: default_nonce(),
            timestamp: default_timestamp(),
            forks: Forks::default(),
            accounts: Vec::new(),
            ethash: None,
            clique: None,
            ibft2: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Forks {
    #[serde(default)]
    pub homestead: u64,
    #[serde(default)]
    pub eip150: u64,
    #[serde(default)]
    pub eip155: u64,
    #[serde(default)]
    pub eip158: u64,
    #[serde(default)]
    pub byzantium: u64,
    #[serde(default)]
    pub constantinople: u64,
    #[serde(default)]
    pub petersburg: u64,
    #[serde(default)]
    pub istanbul: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<std::collections::BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ethash {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_difficulty: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Clique {
    #[serde(default = "default_block_period")]
    pub block_period: u64,

    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,

    /// Initial signer addresses
    #[serde(default)]
    pub signers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ibft2 {
    #[serde(default = "default_block_period")]
    pub block_period: u64,

    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Initial validator addresses
    #[serde(default)]
    pub validators: Vec<String>,
}

fn default_block_period() -> u64 {
    15
}

fn default_epoch_length() -> u64 {
    30000
}

fn default_request_timeout() -> u64 {
    10
}
