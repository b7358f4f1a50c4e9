//! Mock ClusterStore for unit testing
//!
//! Keeps objects in memory, records every write so tests can assert on
//! idempotence, assigns uids and Service cluster IPs the way the API server
//! would, and can be told to fail specific operations.

use crate::error::StoreError;
use crate::resource::{ChildResource, ResourceKind};
use crate::store_trait::ClusterStore;
use crds::{Fleet, FleetStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// A write observed by the mock store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Created(ResourceKind, String),
    Replaced(ResourceKind, String),
    Deleted(ResourceKind, String),
    FleetStatusPatched(String),
}

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Replace,
    Delete,
}

type ObjectKey = (ResourceKind, String, String);

/// In-memory cluster store
#[derive(Debug, Clone, Default)]
pub struct MockClusterStore {
    objects: Arc<Mutex<BTreeMap<ObjectKey, ChildResource>>>,
    fleets: Arc<Mutex<BTreeMap<(String, String), Fleet>>>,
    mutations: Arc<Mutex<Vec<Mutation>>>,
    failures: Arc<Mutex<HashMap<(StoreOp, ResourceKind), String>>>,
    next_ip: Arc<Mutex<u32>>,
    next_version: Arc<Mutex<u64>>,
}

impl MockClusterStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a mutation (for test setup)
    pub fn insert(&self, namespace: &str, mut object: ChildResource) {
        let meta = object.metadata_mut();
        meta.namespace = Some(namespace.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        let key = (object.kind(), namespace.to_string(), object.name().to_string());
        self.objects.lock().unwrap().insert(key, object);
    }

    /// Seed a fleet (for test setup)
    pub fn insert_fleet(&self, fleet: Fleet) {
        let namespace = fleet.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = fleet.metadata.name.clone().unwrap_or_default();
        self.fleets.lock().unwrap().insert((namespace, name), fleet);
    }

    /// Current copy of a stored object
    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<ChildResource> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of stored objects of `kind` in `namespace`, sorted
    pub fn names(&self, kind: ResourceKind, namespace: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Total number of stored child objects
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Current status of a stored fleet
    pub fn fleet_status(&self, namespace: &str, name: &str) -> Option<FleetStatus> {
        self.fleets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|f| f.status.clone())
    }

    /// Writes recorded so far
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    /// Forget recorded writes
    pub fn clear_mutations(&self) {
        self.mutations.lock().unwrap().clear();
    }

    /// Make every `op` on `kind` fail with `message`
    pub fn fail_on(&self, op: StoreOp, kind: ResourceKind, message: impl Into<String>) {
        self.failures.lock().unwrap().insert((op, kind), message.into());
    }

    /// Stop failing `op` on `kind`
    pub fn clear_failure(&self, op: StoreOp, kind: ResourceKind) {
        self.failures.lock().unwrap().remove(&(op, kind));
    }

    fn check_failure(&self, op: StoreOp, kind: ResourceKind) -> Result<(), StoreError> {
        match self.failures.lock().unwrap().get(&(op, kind)) {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn record(&self, mutation: Mutation) {
        self.mutations.lock().unwrap().push(mutation);
    }

    fn next_resource_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn allocate_cluster_ip(&self) -> String {
        let mut next = self.next_ip.lock().unwrap();
        *next += 1;
        format!("10.96.{}.{}", *next / 250, *next % 250 + 1)
    }
}

#[async_trait::async_trait]
impl ClusterStore for MockClusterStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChildResource>, StoreError> {
        self.check_failure(StoreOp::Get, kind)?;
        Ok(self.object(kind, namespace, name))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ChildResource>, StoreError> {
        self.check_failure(StoreOp::List, kind)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), obj)| *k == kind && ns == namespace && obj.matches_labels(labels))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, object: &ChildResource) -> Result<ChildResource, StoreError> {
        let kind = object.kind();
        self.check_failure(StoreOp::Create, kind)?;
        let key = (kind, namespace.to_string(), object.name().to_string());
        if self.objects.lock().unwrap().contains_key(&key) {
            return Err(StoreError::Conflict(format!("{} {}/{} already exists", kind, namespace, object.name())));
        }

        let mut stored = object.clone();
        let resource_version = self.next_resource_version();
        {
            let meta = stored.metadata_mut();
            meta.namespace = Some(namespace.to_string());
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
            meta.resource_version = Some(resource_version);
        }
        if let ChildResource::Endpoint(svc) = &mut stored {
            let spec = svc.spec.get_or_insert_with(Default::default);
            if spec.cluster_ip.is_none() {
                spec.cluster_ip = Some(self.allocate_cluster_ip());
            }
        }

        self.objects.lock().unwrap().insert(key, stored.clone());
        self.record(Mutation::Created(kind, object.name().to_string()));
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, object: &ChildResource) -> Result<ChildResource, StoreError> {
        let kind = object.kind();
        self.check_failure(StoreOp::Replace, kind)?;
        let key = (kind, namespace.to_string(), object.name().to_string());
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", kind, namespace, object.name())))?;

        let mut stored = object.clone();
        {
            let uid = current.metadata().uid.clone();
            let meta = stored.metadata_mut();
            meta.uid = uid;
            meta.resource_version = Some(self.next_resource_version());
        }
        objects.insert(key, stored.clone());
        drop(objects);
        self.record(Mutation::Replaced(kind, object.name().to_string()));
        Ok(stored)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.check_failure(StoreOp::Delete, kind)?;
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(kind, namespace.to_string(), name.to_string()));
        match removed {
            Some(_) => {
                self.record(Mutation::Deleted(kind, name.to_string()));
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("{} {}/{}", kind, namespace, name))),
        }
    }

    async fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Fleet>, StoreError> {
        Ok(self
            .fleets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_fleet_status(&self, namespace: &str, name: &str, status: &FleetStatus) -> Result<(), StoreError> {
        let mut fleets = self.fleets.lock().unwrap();
        let fleet = fleets
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("Fleet {}/{}", namespace, name)))?;
        fleet.status = Some(status.clone());
        drop(fleets);
        self.record(Mutation::FleetStatusPatched(name.to_string()));
        Ok(())
    }
}
