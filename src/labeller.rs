//! Object naming and labels
//!
//! Every object the operator creates carries a stable name derived from the
//! component and a common label set, so a later tick finds the same object.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::DEFAULT_POOL_NAME;

/// Label carrying the component label value
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
/// Label carrying the owning cluster name
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// Label carrying the product name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label marking objects managed by this operator
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Value of [`LABEL_MANAGED_BY`]
pub const MANAGED_BY: &str = "ytsaurus-operator";

/// Append a pool suffix unless the pool is the default one
pub fn format_with_default(base: &str, name: &str) -> String {
    if name.is_empty() || name == DEFAULT_POOL_NAME {
        base.to_string()
    } else {
        format!("{base}-{name}")
    }
}

/// Names and labels for one component of one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labeller {
    /// Name of the owning Ytsaurus (or Spyt) resource
    pub cluster_name: String,
    /// Namespace every owned object lives in
    pub namespace: String,
    /// Lowercase label value, also the prefix of derived object names
    pub component_label: String,
    /// Component identity reported to the outer loop
    pub component_name: String,
}

impl Labeller {
    /// Create a labeller for a component of the given cluster
    pub fn new(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        component_label: impl Into<String>,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            component_label: component_label.into(),
            component_name: component_name.into(),
        }
    }

    /// Labels used to select the component's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_INSTANCE.to_string(), self.cluster_name.clone()),
            (LABEL_COMPONENT.to_string(), self.component_label.clone()),
        ])
    }

    /// Full label set attached to every owned object
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(LABEL_NAME.to_string(), "ytsaurus".to_string());
        labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
        labels
    }

    /// Metadata for an owned object with the given name
    pub fn object_meta(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    /// Name of the component's secret
    pub fn secret_name(&self) -> String {
        format!("{}-secret", self.component_label)
    }

    /// Name of the component's main config map
    pub fn main_config_map_name(&self) -> String {
        format!("{}-config", self.component_label)
    }

    /// Name of one of the component's init jobs
    pub fn init_job_name(&self, job: &str) -> String {
        format!("{}-init-job-{}", self.component_label, job.to_lowercase())
    }

    /// Name of the config map backing one of the component's init jobs
    pub fn init_job_config_map_name(&self, job: &str) -> String {
        format!("{}-config", self.init_job_name(job))
    }
}
