//! [`ObjectStore`] backed by a live Kubernetes API server

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::Client;
use tracing::debug;

use super::{ObjectKey, ObjectStore};
use crate::{Error, FIELD_MANAGER};

/// Real object store using dynamic objects and server-side apply
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a new store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &key.namespace, &key.api_resource())
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error> {
        let object = self
            .api(key)
            .get_opt(&key.name)
            .await
            .map_err(|e| Error::fetch(key.to_string(), e.to_string()))?;

        object
            .map(|o| serde_json::to_value(o).map_err(|e| Error::fetch(key.to_string(), e.to_string())))
            .transpose()
    }

    async fn apply(&self, key: &ObjectKey, object: serde_json::Value) -> Result<(), Error> {
        // Forcing only takes over the fields we declare; fields owned by other
        // managers are left in place.
        self.api(key)
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&object),
            )
            .await
            .map_err(|e| Error::apply(key.to_string(), e.to_string()))?;

        debug!(object = %key, namespace = %key.namespace, "applied object");
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), Error> {
        match self.api(key).delete(&key.name, &DeleteParams::background()).await {
            Ok(_) => {
                debug!(object = %key, namespace = %key.namespace, "deleted object");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::apply(key.to_string(), e.to_string())),
        }
    }
}
