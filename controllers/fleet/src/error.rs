//! Controller-specific error types.
//!
//! Planner, key and convergence errors abort the current pass. Garbage
//! collection failures are collected per kind and surfaced once at the end.

use cluster_store::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Fleet Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Node names a client family with no strategy
    #[error("Unsupported client software: {0}")]
    UnsupportedSoftwareFamily(String),

    /// Private key is not a well-formed secp256k1 key
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Genesis could not be rendered for the client family
    #[error("Genesis rendering failed: {0}")]
    GenesisRenderError(String),

    /// Cluster store error (includes timeouts and conflicts)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Bootnode has no public identity or no reachable endpoint
    #[error("Unresolved peer address: {0}")]
    UnresolvedPeerAddress(String),

    /// One or more kinds failed during garbage collection
    #[error("Garbage collection failed: {0}")]
    GarbageCollection(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
