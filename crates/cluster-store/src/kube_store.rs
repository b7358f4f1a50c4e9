//! Kubernetes-backed store
//!
//! Every call is bounded by the configured timeout; an expired call surfaces
//! as `StoreError::Timeout` and is never retried here.

use crate::error::StoreError;
use crate::resource::{ChildResource, ResourceKind};
use crate::store_trait::{label_selector, ClusterStore};
use crds::{Fleet, FleetStatus};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Cluster store talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store with a per-call timeout
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Get the underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn timed<T, F>(&self, operation: String, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Err(kube::Error::Api(response))) if response.code == 404 => Err(StoreError::NotFound(operation)),
            Ok(Err(kube::Error::Api(response))) if response.code == 409 => Err(StoreError::Conflict(operation)),
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                warn!("{} timed out after {:?}", operation, self.timeout);
                Err(StoreError::Timeout {
                    operation,
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.api::<K>(namespace);
        self.timed(
            format!("get {} {}/{}", std::any::type_name::<K>(), namespace, name),
            api.get_opt(name),
        )
        .await
    }

    async fn list_typed<K>(&self, namespace: &str, selector: &str) -> Result<Vec<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.api::<K>(namespace);
        let params = ListParams::default().labels(selector);
        let list = self
            .timed(
                format!("list {} in {} ({})", std::any::type_name::<K>(), namespace, selector),
                api.list(&params),
            )
            .await?;
        Ok(list.items)
    }

    async fn create_typed<K>(&self, namespace: &str, object: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.api::<K>(namespace);
        let name = object.meta().name.clone().unwrap_or_default();
        self.timed(
            format!("create {} {}/{}", std::any::type_name::<K>(), namespace, name),
            api.create(&PostParams::default(), object),
        )
        .await
    }

    async fn replace_typed<K>(&self, namespace: &str, object: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.api::<K>(namespace);
        let name = object.meta().name.clone().unwrap_or_default();
        self.timed(
            format!("replace {} {}/{}", std::any::type_name::<K>(), namespace, name),
            api.replace(&name, &PostParams::default(), object),
        )
        .await
    }

    async fn delete_typed<K>(&self, namespace: &str, name: &str) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.api::<K>(namespace);
        self.timed(
            format!("delete {} {}/{}", std::any::type_name::<K>(), namespace, name),
            api.delete(name, &DeleteParams::background()),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChildResource>, StoreError> {
        let object = match kind {
            ResourceKind::Volume => self
                .get_typed::<PersistentVolumeClaim>(namespace, name)
                .await?
                .map(ChildResource::Volume),
            ResourceKind::Config => self
                .get_typed::<ConfigMap>(namespace, name)
                .await?
                .map(ChildResource::Config),
            ResourceKind::Secret => self
                .get_typed::<Secret>(namespace, name)
                .await?
                .map(ChildResource::Secret),
            ResourceKind::Endpoint => self
                .get_typed::<Service>(namespace, name)
                .await?
                .map(ChildResource::Endpoint),
            ResourceKind::Workload => self
                .get_typed::<Deployment>(namespace, name)
                .await?
                .map(ChildResource::Workload),
        };
        Ok(object)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ChildResource>, StoreError> {
        let selector = label_selector(labels);
        debug!("Listing {} in {} with selector {}", kind, namespace, selector);
        let items = match kind {
            ResourceKind::Volume => self
                .list_typed::<PersistentVolumeClaim>(namespace, &selector)
                .await?
                .into_iter()
                .map(ChildResource::Volume)
                .collect(),
            ResourceKind::Config => self
                .list_typed::<ConfigMap>(namespace, &selector)
                .await?
                .into_iter()
                .map(ChildResource::Config)
                .collect(),
            ResourceKind::Secret => self
                .list_typed::<Secret>(namespace, &selector)
                .await?
                .into_iter()
                .map(ChildResource::Secret)
                .collect(),
            ResourceKind::Endpoint => self
                .list_typed::<Service>(namespace, &selector)
                .await?
                .into_iter()
                .map(ChildResource::Endpoint)
                .collect(),
            ResourceKind::Workload => self
                .list_typed::<Deployment>(namespace, &selector)
                .await?
                .into_iter()
                .map(ChildResource::Workload)
                .collect(),
        };
        Ok(items)
    }

    async fn create(&self, namespace: &str, object: &ChildResource) -> Result<ChildResource, StoreError> {
        let created = match object {
            ChildResource::Volume(o) => ChildResource::Volume(self.create_typed(namespace, o).await?),
            ChildResource::Config(o) => ChildResource::Config(self.create_typed(namespace, o).await?),
            ChildResource::Secret(o) => ChildResource::Secret(self.create_typed(namespace, o).await?),
            ChildResource::Endpoint(o) => ChildResource::Endpoint(self.create_typed(namespace, o).await?),
            ChildResource::Workload(o) => ChildResource::Workload(self.create_typed(namespace, o).await?),
        };
        Ok(created)
    }

    async fn replace(&self, namespace: &str, object: &ChildResource) -> Result<ChildResource, StoreError> {
        let replaced = match object {
            ChildResource::Volume(o) => ChildResource::Volume(self.replace_typed(namespace, o).await?),
            ChildResource::Config(o) => ChildResource::Config(self.replace_typed(namespace, o).await?),
            ChildResource::Secret(o) => ChildResource::Secret(self.replace_typed(namespace, o).await?),
            ChildResource::Endpoint(o) => ChildResource::Endpoint(self.replace_typed(namespace, o).await?),
            ChildResource::Workload(o) => ChildResource::Workload(self.replace_typed(namespace, o).await?),
        };
        Ok(replaced)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), StoreError> {
        match kind {
            ResourceKind::Volume => self.delete_typed::<PersistentVolumeClaim>(namespace, name).await,
            ResourceKind::Config => self.delete_typed::<ConfigMap>(namespace, name).await,
            ResourceKind::Secret => self.delete_typed::<Secret>(namespace, name).await,
            ResourceKind::Endpoint => self.delete_typed::<Service>(namespace, name).await,
            ResourceKind::Workload => self.delete_typed::<Deployment>(namespace, name).await,
        }
    }

    async fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Fleet>, StoreError> {
        self.get_typed::<Fleet>(namespace, name).await
    }

    async fn patch_fleet_status(&self, namespace: &str, name: &str, status: &FleetStatus) -> Result<(), StoreError> {
        let api = self.api::<Fleet>(namespace);
        let patch = serde_json::json!({ "status": status });
        let pp = PatchParams::default();
        self.timed(
            format!("patch Fleet status {}/{}", namespace, name),
            api.patch_status(name, &pp, &Patch::Merge(&patch)),
        )
        .await
        .map(|_| ())
    }
}
