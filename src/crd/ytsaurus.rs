//! Ytsaurus Custom Resource Definition
//!
//! The Ytsaurus CRD declares a whole cluster: masters, exec node pools and
//! optional auxiliary services. Its status sub-resource carries the only state
//! the operator persists between reconcile ticks.

use std::collections::HashSet;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ClusterState, ExecNodesSpec, InstanceSpec, UiSpec, UpdateStatus};

/// Specification for a Ytsaurus cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.ytsaurus.tech",
    version = "v1",
    kind = "Ytsaurus",
    plural = "ytsaurus",
    shortname = "yt",
    status = "YtsaurusStatus",
    namespaced,
    printcolumn = r#"{"name":"ClusterState","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"UpdateState","type":"string","jsonPath":".status.updateStatus.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct YtsaurusSpec {
    /// Image used by every server component without its own override
    pub core_image: String,

    /// Image pull secrets attached to every pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<String>,

    /// Master replica group
    pub masters: InstanceSpec,

    /// Exec node pools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec_nodes: Vec<ExecNodesSpec>,

    /// Web UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiSpec>,

    /// Config map with user overrides, keyed by config file name.
    ///
    /// Each value is a JSON object deep-merged into the generated file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_overrides: Option<String>,
}

impl YtsaurusSpec {
    /// Fill fields the admission layer would default
    pub fn apply_defaults(&mut self) {
        if self.masters.enable_anti_affinity.is_none() {
            self.masters.enable_anti_affinity = Some(true);
        }
    }

    /// Validate the cluster specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.core_image.is_empty() {
            return Err(crate::Error::validation("coreImage must not be empty"));
        }

        if self.masters.instance_count < 1 {
            return Err(crate::Error::validation(
                "masters.instanceCount must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for pool in &self.exec_nodes {
            if !seen.insert(pool.name.as_str()) {
                return Err(crate::Error::validation(format!(
                    "duplicate exec node pool '{}'",
                    pool.name
                )));
            }
            if pool.instance.instance_count < 0 {
                return Err(crate::Error::validation(format!(
                    "exec node pool '{}' has negative instanceCount",
                    pool.name
                )));
            }
        }

        Ok(())
    }

    /// Image for a replica group, falling back to the core image
    pub fn image_for(&self, instance: &InstanceSpec) -> String {
        instance
            .image
            .clone()
            .unwrap_or_else(|| self.core_image.clone())
    }
}

/// Status for a Ytsaurus cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YtsaurusStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub state: ClusterState,

    /// Rolling update progress
    #[serde(default)]
    pub update_status: UpdateStatus,

    /// Human-readable message about the current state; written as `null`
    /// when cleared
    #[serde(default)]
    pub message: Option<String>,
}

impl YtsaurusStatus {
    /// Create a new status with the given state
    pub fn with_state(state: ClusterState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}
