//! Replica-managed process groups (Deployment, StatefulSet)

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::labeller::Labeller;
use crate::Error;

/// Name of the main container in every workload the operator builds
pub const MAIN_CONTAINER_NAME: &str = "ytserver";

/// Where a component's config map is mounted in its containers
pub const CONFIG_MOUNT_PATH: &str = "/config";

const CONFIG_VOLUME_NAME: &str = "config";

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Desired shape of a replica group
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadTemplate {
    /// Object name
    pub name: String,
    /// Governing service (StatefulSet only)
    pub service_name: String,
    /// Desired replica count
    pub replicas: i32,
    /// Image of the main container
    pub image: String,
    /// Config map mounted at [`CONFIG_MOUNT_PATH`]
    pub config_map: Option<String>,
    /// Main container command; the image entrypoint runs when empty
    pub command: Vec<String>,
    /// Forbid two replicas on one node
    pub anti_affinity: bool,
    /// Containers appended after the main one
    pub sidecars: Vec<Container>,
}

/// Common view over the kinds that run a component's replicas
pub trait ReplicaGroup:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Object built from the template: metadata, selector and pod template
    fn skeleton(labeller: &Labeller, template: &WorkloadTemplate) -> Result<Self, Error>;

    /// Desired replica count from the spec
    fn replicas(&self) -> Option<i32>;

    /// Replicas reported ready by the controller owning the group
    fn ready_replicas(&self) -> i32;

    /// Pod spec of the template
    fn pod_spec(&self) -> Option<&PodSpec>;

    /// Image of the main container
    fn image(&self) -> Option<&str> {
        self.pod_spec()
            .and_then(|ps| ps.containers.first())
            .and_then(|c| c.image.as_deref())
    }

    /// Whether the observed group differs from the desired replicas or image
    fn differs_from(&self, replicas: i32, image: &str) -> bool {
        self.replicas().unwrap_or(1) != replicas || self.image() != Some(image)
    }

    /// Whether the observed group runs a different image than desired
    fn image_differs(&self, image: &str) -> bool {
        self.image() != Some(image)
    }

    /// Whether the containers after the main one differ by name or image
    fn sidecars_differ(&self, sidecars: &[Container]) -> bool {
        let observed = self
            .pod_spec()
            .map(|ps| ps.containers.iter().skip(1).collect::<Vec<_>>())
            .unwrap_or_default();
        observed.len() != sidecars.len()
            || observed
                .iter()
                .zip(sidecars)
                .any(|(o, d)| o.name != d.name || o.image != d.image)
    }

    /// Ready replica count equals the desired count
    fn are_pods_ready(&self) -> bool {
        self.ready_replicas() == self.replicas().unwrap_or(1)
    }
}

fn skeleton_json(
    kind: &str,
    labeller: &Labeller,
    template: &WorkloadTemplate,
) -> Result<serde_json::Value, serde_json::Error> {
    let mut main = json!({
        "name": MAIN_CONTAINER_NAME,
        "image": template.image,
    });
    if !template.command.is_empty() {
        main["command"] = json!(template.command);
    }

    let mut pod = json!({});
    if let Some(config_map) = &template.config_map {
        main["volumeMounts"] = json!([{
            "name": CONFIG_VOLUME_NAME,
            "mountPath": CONFIG_MOUNT_PATH,
        }]);
        pod["volumes"] = json!([{
            "name": CONFIG_VOLUME_NAME,
            "configMap": { "name": config_map },
        }]);
    }
    if template.anti_affinity {
        pod["affinity"] = json!({
            "podAntiAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": [{
                    "labelSelector": { "matchLabels": labeller.selector_labels() },
                    "topologyKey": HOSTNAME_TOPOLOGY_KEY,
                }]
            }
        });
    }
    let mut containers = vec![main];
    for sidecar in &template.sidecars {
        containers.push(serde_json::to_value(sidecar)?);
    }
    pod["containers"] = serde_json::Value::Array(containers);

    let mut spec = json!({
        "replicas": template.replicas,
        "selector": { "matchLabels": labeller.selector_labels() },
        "template": {
            "metadata": { "labels": labeller.labels() },
            "spec": pod,
        }
    });
    if kind == "StatefulSet" {
        spec["serviceName"] = json!(template.service_name);
        spec["podManagementPolicy"] = json!("Parallel");
    }

    Ok(json!({
        "apiVersion": "apps/v1",
        "kind": kind,
        "metadata": {
            "name": template.name,
            "namespace": labeller.namespace,
            "labels": labeller.labels(),
        },
        "spec": spec,
    }))
}

impl ReplicaGroup for StatefulSet {
    fn skeleton(labeller: &Labeller, template: &WorkloadTemplate) -> Result<Self, Error> {
        skeleton_json("StatefulSet", labeller, template)
            .and_then(serde_json::from_value)
            .map_err(|e| Error::serialization(format!("statefulset {}: {e}", template.name)))
    }

    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref().and_then(|s| s.template.spec.as_ref())
    }
}

impl ReplicaGroup for Deployment {
    fn skeleton(labeller: &Labeller, template: &WorkloadTemplate) -> Result<Self, Error> {
        skeleton_json("Deployment", labeller, template)
            .and_then(serde_json::from_value)
            .map_err(|e| Error::serialization(format!("deployment {}: {e}", template.name)))
    }

    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref().and_then(|s| s.template.spec.as_ref())
    }
}
