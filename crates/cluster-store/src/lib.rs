//! Cluster resource store
//!
//! The narrow slice of the Kubernetes API the fleet controller depends on:
//! typed get/list/create/replace/delete of the five child resource kinds a
//! fleet owns, plus fleet lookup and status patching.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{create_or_update, ClusterStore, KubeStore, ResourceKind};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeStore::new(client, Duration::from_secs(30));
//!
//! let (result, _object) = create_or_update(
//!     &store,
//!     ResourceKind::Config,
//!     "default",
//!     "demo-node-0-geth",
//!     |object| {
//!         object.labels_mut().insert("app.kubernetes.io/name".into(), "node".into());
//!     },
//! ).await?;
//! println!("configmap {result}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod kube_store;
pub mod ops;
pub mod resource;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::StoreError;
pub use kube_store::KubeStore;
pub use ops::{create_or_update, OperationResult};
pub use resource::{ChildResource, ResourceKind};
pub use store_trait::{label_selector, ClusterStore};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClusterStore, Mutation, StoreOp};
