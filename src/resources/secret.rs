//! Key/value secret owned by a component

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;

use super::{Managed, ObjectStore};
use crate::labeller::Labeller;
use crate::Error;

/// A secret holding string values under well-known keys
#[derive(Debug)]
pub struct StringSecret {
    labeller: Labeller,
    secret: Managed<Secret>,
}

impl StringSecret {
    /// Create a handle for the named secret
    pub fn new(name: &str, labeller: &Labeller, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            labeller: labeller.clone(),
            secret: Managed::new(store, &labeller.namespace, name),
        }
    }

    /// Name of the secret
    pub fn name(&self) -> &str {
        self.secret.name()
    }

    /// Load the current state of the secret
    pub async fn fetch(&mut self) -> Result<(), Error> {
        self.secret.fetch().await
    }

    /// Value stored under `key`, from either `data` or `stringData`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let secret = self.secret.observed()?;
        if let Some(value) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
            return Some(value.clone());
        }
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(|v| String::from_utf8(v.0.clone()).ok())
    }

    /// True when the secret is missing, lacks `key`, or holds a value other
    /// than `expected` (an empty `expected` accepts any value)
    pub fn need_sync(&self, key: &str, expected: &str) -> bool {
        match self.get_value(key) {
            None => true,
            Some(value) => !expected.is_empty() && value != expected,
        }
    }

    /// Desired secret skeleton, carrying over values already stored
    pub fn build(&self) -> Secret {
        let mut string_data = BTreeMap::new();
        if let Some(secret) = self.secret.observed() {
            for (k, v) in secret.data.iter().flatten() {
                if let Ok(value) = String::from_utf8(v.0.clone()) {
                    string_data.insert(k.clone(), value);
                }
            }
            for (k, v) in secret.string_data.iter().flatten() {
                string_data.insert(k.clone(), v.clone());
            }
        }

        Secret {
            metadata: self.labeller.object_meta(self.secret.name()),
            string_data: Some(string_data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        }
    }

    /// Apply the given desired secret
    pub async fn sync(&self, desired: &Secret) -> Result<(), Error> {
        self.secret.apply(desired).await
    }
}
