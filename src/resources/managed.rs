//! Typed handle over one named object

use std::fmt;
use std::sync::Arc;

use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::{ObjectKey, ObjectStore};
use crate::Error;

/// One object the operator owns, with the state observed by the last fetch
pub struct Managed<K> {
    key: ObjectKey,
    store: Arc<dyn ObjectStore>,
    observed: Option<K>,
}

impl<K> fmt::Debug for Managed<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("key", &self.key)
            .field("fetched", &self.observed.is_some())
            .finish()
    }
}

impl<K> Managed<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a handle; nothing is read until [`Managed::fetch`]
    pub fn new(store: Arc<dyn ObjectStore>, namespace: &str, name: &str) -> Self {
        Self {
            key: ObjectKey::of::<K>(namespace, name),
            store,
            observed: None,
        }
    }

    /// Name of the object
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Key of the object
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Load the current state of the object
    pub async fn fetch(&mut self) -> Result<(), Error> {
        self.observed = match self.store.get(&self.key).await? {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| Error::fetch(self.key.to_string(), e.to_string()))?,
            ),
            None => None,
        };
        Ok(())
    }

    /// Whether the last fetch found the object
    pub fn exists(&self) -> bool {
        self.observed.is_some()
    }

    /// State observed by the last fetch
    pub fn observed(&self) -> Option<&K> {
        self.observed.as_ref()
    }

    /// Create or patch the object to the desired state
    pub async fn apply(&self, desired: &K) -> Result<(), Error> {
        let value =
            serde_json::to_value(desired).map_err(|e| Error::serialization(e.to_string()))?;
        info!(object = %self.key, namespace = %self.key.namespace, "applying");
        self.store.apply(&self.key, value).await
    }

    /// Delete the object; a no-op when it does not exist
    pub async fn delete(&self) -> Result<(), Error> {
        info!(object = %self.key, namespace = %self.key.namespace, "deleting");
        self.store.delete(&self.key).await
    }
}
