//! ClusterStore trait for mocking
//!
//! This trait abstracts the Kubernetes API so the reconciler can be unit
//! tested against an in-memory store. `KubeStore` implements it for a real
//! cluster; `MockClusterStore` (feature `test-util`) for tests.

use crate::error::StoreError;
use crate::resource::{ChildResource, ResourceKind};
use crds::{Fleet, FleetStatus};
use std::collections::BTreeMap;

/// Cluster resource store operations
///
/// All methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a child resource by name; `Ok(None)` when it does not exist
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChildResource>, StoreError>;

    /// List child resources carrying every label in `labels`
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ChildResource>, StoreError>;

    /// Create a new object, returning the stored version
    async fn create(&self, namespace: &str, object: &ChildResource) -> Result<ChildResource, StoreError>;

    /// Replace an existing object, returning the stored version
    async fn replace(&self, namespace: &str, object: &ChildResource) -> Result<ChildResource, StoreError>;

    /// Delete a child resource
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), StoreError>;

    // Fleet operations
    async fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Fleet>, StoreError>;
    async fn patch_fleet_status(&self, namespace: &str, name: &str, status: &FleetStatus) -> Result<(), StoreError>;
}

/// Render a label map as a Kubernetes equality selector (`a=1,b=2`).
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
