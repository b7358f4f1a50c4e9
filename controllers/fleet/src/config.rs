//! Controller configuration from environment variables.

use crate::client::Images;
use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GETH_IMAGE: &str = "ethereum/client-go:v1.10.1";
pub const DEFAULT_BESU_IMAGE: &str = "hyperledger/besu:21.1.2";
pub const DEFAULT_IPFS_IMAGE: &str = "ipfs/go-ipfs:v0.8.0";

const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONCILE_CONCURRENCY: u16 = 4;
const DEFAULT_RECONCILE_DEBOUNCE_SECS: u64 = 2;

/// Runtime settings for the controller process.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,
    pub images: Images,
    /// Upper bound for every cluster store call
    pub store_timeout: Duration,
    /// Fleets reconciled in parallel
    pub concurrency: u16,
    pub debounce: Duration,
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let images = Images {
            geth: text("GETH_IMAGE", DEFAULT_GETH_IMAGE),
            besu: text("BESU_IMAGE", DEFAULT_BESU_IMAGE),
            ipfs: text("IPFS_IMAGE", DEFAULT_IPFS_IMAGE),
        };

        let store_timeout_secs: u64 = number(&lookup, "STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS)?;
        let concurrency: u16 = number(&lookup, "RECONCILE_CONCURRENCY", DEFAULT_RECONCILE_CONCURRENCY)?;
        let debounce_secs: u64 = number(&lookup, "RECONCILE_DEBOUNCE_SECS", DEFAULT_RECONCILE_DEBOUNCE_SECS)?;

        if store_timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "STORE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            images,
            store_timeout: Duration::from_secs(store_timeout_secs),
            concurrency,
            debounce: Duration::from_secs(debounce_secs),
        })
    }
}

fn number<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} must be a number, got {:?}: {}", key, raw, e))
        }),
    }
}
