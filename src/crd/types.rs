//! Supporting types for the Ytsaurus and Spyt CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name used for a pool when the user gives none
pub const DEFAULT_POOL_NAME: &str = "default";

/// Coarse lifecycle phase of a YTsaurus cluster
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClusterState {
    /// Resource observed for the first time
    #[default]
    Created,
    /// Components are being brought up for the first time
    Initializing,
    /// Every component is ready
    Running,
    /// A rolling update is in progress, see [`UpdateState`]
    Updating,
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Running => write!(f, "Running"),
            Self::Updating => write!(f, "Updating"),
        }
    }
}

/// Sub-phase of a rolling update
///
/// Only meaningful while the cluster is [`ClusterState::Updating`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpdateState {
    /// No update in progress
    #[default]
    None,
    /// Running replicas of the components in scope are being deleted
    WaitingForPodsRemoval,
    /// Components in scope are being recreated from the new spec
    WaitingForPodsCreation,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::WaitingForPodsRemoval => write!(f, "WaitingForPodsRemoval"),
            Self::WaitingForPodsCreation => write!(f, "WaitingForPodsCreation"),
        }
    }
}

/// Progress of a rolling update
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    /// Current update sub-phase
    #[serde(default)]
    pub state: UpdateState,

    /// Components allowed through the pods-removal barrier.
    ///
    /// `None` means the update is cluster-wide. Serialized as `null` so a
    /// merge patch clears a scope left over from the previous update.
    #[serde(default)]
    pub components: Option<Vec<String>>,
}

/// Replica group shared by every server component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Image override; the cluster's core image is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Number of replicas
    #[serde(default = "default_instance_count")]
    pub instance_count: i32,

    /// Spread replicas across nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_anti_affinity: Option<bool>,
}

fn default_instance_count() -> i32 {
    1
}

/// A named pool of exec nodes
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecNodesSpec {
    /// Pool name; `default` keeps the unsuffixed component name
    #[serde(default = "default_pool_name")]
    pub name: String,

    /// Replica group settings
    #[serde(flatten)]
    pub instance: InstanceSpec,

    /// Extra containers for the exec node pod, each a YAML-encoded Container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<String>,
}

fn default_pool_name() -> String {
    DEFAULT_POOL_NAME.to_string()
}

/// Web UI settings
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiSpec {
    /// UI image
    pub image: String,

    /// Number of UI replicas
    #[serde(default = "default_instance_count")]
    pub instance_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_node_pool_defaults() {
        let spec: ExecNodesSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.name, DEFAULT_POOL_NAME);
        assert_eq!(spec.instance.instance_count, 1);
        assert!(spec.sidecars.is_empty());
    }

    #[test]
    fn instance_fields_are_flattened_into_pool() {
        let spec: ExecNodesSpec = serde_json::from_value(serde_json::json!({
            "name": "gpu",
            "instanceCount": 3,
            "image": "ytsaurus/ytsaurus:23.2",
        }))
        .unwrap();
        assert_eq!(spec.instance.instance_count, 3);
        assert_eq!(spec.instance.image.as_deref(), Some("ytsaurus/ytsaurus:23.2"));
    }

    #[test]
    fn update_status_without_components_is_cluster_wide() {
        let status: UpdateStatus = serde_json::from_value(serde_json::json!({
            "state": "WaitingForPodsRemoval"
        }))
        .unwrap();
        assert_eq!(status.state, UpdateState::WaitingForPodsRemoval);
        assert!(status.components.is_none());
    }

    #[test]
    fn states_display_as_their_variant_names() {
        assert_eq!(ClusterState::Running.to_string(), "Running");
        assert_eq!(ClusterState::Initializing.to_string(), "Initializing");
        assert_eq!(
            UpdateState::WaitingForPodsRemoval.to_string(),
            "WaitingForPodsRemoval"
        );
    }

    #[test]
    fn retired_states_are_rejected() {
        for state in ["UpdateFinishing", "CancelUpdate", "Reconfiguration"] {
            assert!(serde_json::from_value::<ClusterState>(serde_json::json!(state)).is_err());
        }
        assert!(serde_json::from_value::<UpdateState>(serde_json::json!("PossibilityCheck")).is_err());
    }

    #[test]
    fn cluster_wide_scope_serializes_as_null() {
        let json = serde_json::to_value(UpdateStatus::default()).unwrap();
        assert!(json["components"].is_null());
        assert!(json.as_object().unwrap().contains_key("components"));
    }
}
