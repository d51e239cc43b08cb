//! Orchestration-layer access
//!
//! Components never talk to the Kubernetes API directly. They hold typed
//! [`Managed`] handles that read and write through an [`ObjectStore`]:
//! [`KubeObjectStore`] in production, [`MemoryStore`] in tests and offline
//! planning. Every write is a server-side apply (create-if-absent,
//! patch-if-present), so repeating it is harmless.

mod kube_store;
mod managed;
pub mod memory;
mod secret;
mod workload;

use std::fmt;

use async_trait::async_trait;
use kube::discovery::ApiResource;
use kube::Resource;

#[cfg(test)]
use mockall::automock;

use crate::Error;

pub use kube_store::KubeObjectStore;
pub use managed::Managed;
pub use memory::MemoryStore;
pub use secret::StringSecret;
pub use workload::{ReplicaGroup, WorkloadTemplate, CONFIG_MOUNT_PATH};

/// Identity of one namespaced object in the orchestration layer
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// API version (e.g. "apps/v1")
    pub api_version: String,
    /// Kind (e.g. "StatefulSet")
    pub kind: String,
    /// Plural resource name used in API paths
    pub plural: String,
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Key for an object of a statically known kind
    pub fn of<K>(namespace: &str, name: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// The API resource used to build a dynamic `Api`
    pub fn api_resource(&self) -> ApiResource {
        let (group, version) = match self.api_version.rsplit_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), self.api_version.clone()),
        };
        ApiResource {
            group,
            version,
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Generic read/write access to namespaced objects
///
/// Objects cross this boundary as JSON so one trait covers every kind the
/// operator manages; [`Managed`] converts to and from typed objects.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object, `None` if it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error>;

    /// Create or patch an object to the given desired state
    async fn apply(&self, key: &ObjectKey, object: serde_json::Value) -> Result<(), Error>;

    /// Delete an object; deleting an absent object succeeds
    async fn delete(&self, key: &ObjectKey) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn key_for_grouped_kind() {
        let key = ObjectKey::of::<StatefulSet>("yt", "end");
        assert_eq!(key.api_version, "apps/v1");
        assert_eq!(key.kind, "StatefulSet");
        assert_eq!(key.plural, "statefulsets");
        assert_eq!(key.to_string(), "StatefulSet/end");

        let ar = key.api_resource();
        assert_eq!(ar.group, "apps");
        assert_eq!(ar.version, "v1");
    }

    #[test]
    fn key_for_core_kind_has_empty_group() {
        let ar = ObjectKey::of::<ConfigMap>("yt", "cfg").api_resource();
        assert_eq!(ar.group, "");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.plural, "configmaps");
    }
}
