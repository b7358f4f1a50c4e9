//! Genesis helpers shared by the Ethereum strategies.
//!
//! The top-level document layout is common to geth and besu; the clients
//! differ only in the `config` block, which each strategy builds itself.

use crate::error::ControllerError;
use crds::{Account, Forks, Genesis};
use rlp::RlpStream;
use serde_json::{Map, Value, json};

const VANITY_LEN: usize = 32;
const SEAL_LEN: usize = 65;
const ADDRESS_HEX_LEN: usize = 40;

/// Validate an account address, returning its lowercase hex without prefix.
pub fn normalize_address(address: &str) -> Result<String, ControllerError> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    if digits.len() != ADDRESS_HEX_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ControllerError::GenesisRenderError(format!(
            "invalid address {:?}",
            address
        )));
    }
    Ok(digits.to_ascii_lowercase())
}

/// Clique extra data: 32 byte vanity, signer addresses, 65 byte seal.
pub fn clique_extra_data(signers: &[String]) -> Result<String, ControllerError> {
    if signers.is_empty() {
        return Err(ControllerError::GenesisRenderError(
            "clique requires at least one signer".to_string(),
        ));
    }
    let mut extra = String::from("0x");
    extra.push_str(&"00".repeat(VANITY_LEN));
    for signer in signers {
        extra.push_str(&normalize_address(signer)?);
    }
    extra.push_str(&"00".repeat(SEAL_LEN));
    Ok(extra)
}

/// IBFT 2.0 extra data: RLP([vanity, [validators], vote, round, [seals]]).
pub fn ibft2_extra_data(validators: &[String]) -> Result<String, ControllerError> {
    if validators.is_empty() {
        return Err(ControllerError::GenesisRenderError(
            "ibft2 requires at least one validator".to_string(),
        ));
    }
    let mut addresses = Vec::with_capacity(validators.len());
    for validator in validators {
        let digits = normalize_address(validator)?;
        addresses.push(hex::decode(digits).map_err(|e| ControllerError::GenesisRenderError(e.to_string()))?);
    }

    let mut stream = RlpStream::new_list(5);
    stream.append(&vec![0u8; VANITY_LEN]);
    stream.begin_list(addresses.len());
    for address in &addresses {
        stream.append(address);
    }
    // no vote
    stream.append_empty_data();
    // round 0 as a 4 byte integer
    stream.append(&vec![0u8; 4]);
    // no committed seals
    stream.begin_list(0);
    let extra = stream.out();
    Ok(format!("0x{}", hex::encode(extra)))
}

/// Fork activation blocks keyed the way both clients read them.
pub fn fork_blocks(chain_id: u64, forks: &Forks) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("chainId".into(), json!(chain_id));
    config.insert("homesteadBlock".into(), json!(forks.homestead));
    config.insert("eip150Block".into(), json!(forks.eip150));
    config.insert("eip155Block".into(), json!(forks.eip155));
    config.insert("eip158Block".into(), json!(forks.eip158));
    config.insert("byzantiumBlock".into(), json!(forks.byzantium));
    config.insert("constantinopleBlock".into(), json!(forks.constantinople));
    config.insert("petersburgBlock".into(), json!(forks.petersburg));
    config.insert("istanbulBlock".into(), json!(forks.istanbul));
    config
}

fn alloc(accounts: &[Account]) -> Result<Map<String, Value>, ControllerError> {
    let mut alloc = Map::new();
    for account in accounts {
        let address = normalize_address(&account.address)?;
        let mut entry = Map::new();
        entry.insert(
            "balance".into(),
            json!(account.balance.clone().unwrap_or_else(|| "0x0".to_string())),
        );
        if let Some(code) = &account.code {
            entry.insert("code".into(), json!(code));
        }
        if let Some(storage) = &account.storage {
            entry.insert("storage".into(), json!(storage));
        }
        alloc.insert(format!("0x{}", address), Value::Object(entry));
    }
    Ok(alloc)
}

/// Assemble the genesis document around a client specific `config` block.
pub fn document(
    genesis: &Genesis,
    config: Map<String, Value>,
    extra_data: &str,
) -> Result<String, ControllerError> {
    let doc = json!({
        "config": Value::Object(config),
        "nonce": genesis.nonce,
        "timestamp": genesis.timestamp,
        "gasLimit": genesis.gas_limit,
        "difficulty": genesis.difficulty,
        "mixHash": genesis.mix_hash,
        "coinbase": genesis.coinbase,
        "alloc": Value::Object(alloc(&genesis.accounts)?),
        "extraData": extra_data,
    });
    serde_json::to_string_pretty(&doc).map_err(|e| ControllerError::GenesisRenderError(e.to_string()))
}
