//! Create-or-update helper
//!
//! Fetches the named object (or starts from an empty one), lets the caller
//! mutate it, and writes only when the mutation changed something.

use crate::error::StoreError;
use crate::resource::{ChildResource, ResourceKind};
use crate::store_trait::ClusterStore;
use std::fmt;
use tracing::debug;

/// What `create_or_update` did to the object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Created => f.write_str("created"),
            OperationResult::Updated => f.write_str("updated"),
            OperationResult::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Create `kind/name` if absent, otherwise apply `mutate` to the live object
/// and persist it if it changed.
///
/// `mutate` receives either the live object or a fresh empty one; use
/// [`ChildResource::is_persisted`] to tell them apart. Safe to call repeatedly
/// with identical input: an unchanged object is never written.
pub async fn create_or_update<F>(
    store: &dyn ClusterStore,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<(OperationResult, ChildResource), StoreError>
where
    F: FnOnce(&mut ChildResource),
{
    match store.get(kind, namespace, name).await? {
        None => {
            let mut object = ChildResource::empty(kind, namespace, name);
            mutate(&mut object);
            ensure_identity(&object, kind, name)?;
            let created = store.create(namespace, &object).await?;
            Ok((OperationResult::Created, created))
        }
        Some(existing) => {
            let mut object = existing.clone();
            mutate(&mut object);
            ensure_identity(&object, kind, name)?;
            if object == existing {
                debug!("{} {}/{} unchanged, skipping write", kind, namespace, name);
                return Ok((OperationResult::Unchanged, existing));
            }
            let updated = store.replace(namespace, &object).await?;
            Ok((OperationResult::Updated, updated))
        }
    }
}

fn ensure_identity(object: &ChildResource, kind: ResourceKind, name: &str) -> Result<(), StoreError> {
    if object.kind() != kind {
        return Err(StoreError::KindMismatch {
            expected: kind,
            found: object.kind(),
        });
    }
    if object.name() != name {
        return Err(StoreError::Conflict(format!(
            "mutation renamed {} {} to {}",
            kind,
            name,
            object.name()
        )));
    }
    Ok(())
}
