//! Cluster store errors

use crate::resource::ResourceKind;
use thiserror::Error;

/// Errors that can occur when talking to the cluster resource store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The call did not complete within the configured timeout
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists or was modified concurrently
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object handed to a mutation does not match the requested kind
    #[error("Expected {expected} object, found {found}")]
    KindMismatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// Store refused the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
