//! Spyt Custom Resource Definition
//!
//! A Spyt resource asks the operator to publish a SPYT release into an
//! existing Ytsaurus cluster in the same namespace.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::components::SyncStatus;

/// Specification for a SPYT release
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.ytsaurus.tech",
    version = "v1",
    kind = "Spyt",
    plural = "spyts",
    status = "SpytStatus",
    namespaced,
    printcolumn = r#"{"name":"ReleaseStatus","type":"string","jsonPath":".status.releaseStatus"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpytSpec {
    /// Release name, used in object names
    pub name: String,

    /// Image containing the SPYT release and its `/entrypoint.sh`
    pub image: String,

    /// Name of the Ytsaurus resource to publish into
    pub ytsaurus: String,
}

/// Status for a SPYT release
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpytStatus {
    /// Latest status of the release pipeline
    #[serde(default)]
    pub release_status: SyncStatus,

    /// Reason attached to a non-ready status
    #[serde(default)]
    pub reason: Option<String>,
}
