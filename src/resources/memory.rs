//! In-memory [`ObjectStore`]
//!
//! Holds objects in a map and records every mutating call, so callers can
//! assert that a status pass touched nothing or that a converged sync issued
//! no writes. Status sub-resources survive applies the way they do on a real
//! API server. Used by the test suites and for offline what-if planning.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ObjectKey, ObjectStore};
use crate::Error;

/// A mutating call observed by the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Create-or-patch of an object
    Apply(ObjectKey),
    /// Deletion of an object
    Delete(ObjectKey),
}

impl Mutation {
    /// Key the mutation targeted
    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::Apply(key) | Self::Delete(key) => key,
        }
    }
}

/// Store operation, used for failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    /// [`ObjectStore::get`]
    Get,
    /// [`ObjectStore::apply`]
    Apply,
    /// [`ObjectStore::delete`]
    Delete,
}

/// Object store backed by a map
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, serde_json::Value>>,
    mutations: Mutex<Vec<Mutation>>,
    failures: Mutex<BTreeSet<(Operation, String)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object as if it already existed; not recorded as a mutation
    pub fn insert<K>(&self, namespace: &str, object: &K) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::validation("object has no name"))?;
        let value = serde_json::to_value(object).map_err(|e| Error::serialization(e.to_string()))?;
        lock(&self.objects).insert(ObjectKey::of::<K>(namespace, &name), value);
        Ok(())
    }

    /// Read back a typed object
    pub fn object<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        lock(&self.objects)
            .get(&ObjectKey::of::<K>(namespace, name))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether an object of the given kind exists
    pub fn contains<K>(&self, namespace: &str, name: &str) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        lock(&self.objects).contains_key(&ObjectKey::of::<K>(namespace, name))
    }

    /// Modify a stored object in place, as an external actor would.
    ///
    /// Returns false when the object does not exist. Not recorded as a mutation.
    pub fn edit<K>(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) -> bool
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let key = ObjectKey::of::<K>(namespace, name);
        let mut objects = lock(&self.objects);
        let Some(value) = objects.get_mut(&key) else {
            return false;
        };
        let Ok(mut typed) = serde_json::from_value::<K>(value.clone()) else {
            return false;
        };
        f(&mut typed);
        match serde_json::to_value(&typed) {
            Ok(updated) => {
                *value = updated;
                true
            }
            Err(_) => false,
        }
    }

    /// Every mutating call since creation or the last [`MemoryStore::clear_mutations`]
    pub fn mutations(&self) -> Vec<Mutation> {
        lock(&self.mutations).clone()
    }

    /// Number of recorded mutating calls
    pub fn mutation_count(&self) -> usize {
        lock(&self.mutations).len()
    }

    /// Forget recorded mutations
    pub fn clear_mutations(&self) {
        lock(&self.mutations).clear();
    }

    /// Make every `op` on objects of `kind` fail with a transient error
    pub fn fail_on(&self, op: Operation, kind: &str) {
        lock(&self.failures).insert((op, kind.to_string()));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    fn injected(&self, op: Operation, key: &ObjectKey) -> Result<(), Error> {
        if lock(&self.failures).contains(&(op, key.kind.clone())) {
            let msg = "injected failure";
            return Err(match op {
                Operation::Get => Error::fetch(key.to_string(), msg),
                Operation::Apply | Operation::Delete => Error::apply(key.to_string(), msg),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error> {
        self.injected(Operation::Get, key)?;
        Ok(lock(&self.objects).get(key).cloned())
    }

    async fn apply(&self, key: &ObjectKey, mut object: serde_json::Value) -> Result<(), Error> {
        self.injected(Operation::Apply, key)?;
        lock(&self.mutations).push(Mutation::Apply(key.clone()));

        let mut objects = lock(&self.objects);
        if let Some(status) = objects.get(key).and_then(|existing| existing.get("status")) {
            object["status"] = status.clone();
        }
        object["metadata"]["name"] = serde_json::Value::String(key.name.clone());
        object["metadata"]["namespace"] = serde_json::Value::String(key.namespace.clone());
        objects.insert(key.clone(), object);
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), Error> {
        self.injected(Operation::Delete, key)?;
        lock(&self.mutations).push(Mutation::Delete(key.clone()));
        lock(&self.objects).remove(key);
        Ok(())
    }
}
