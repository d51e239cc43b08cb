//! Shared fixtures for reconciliation stories

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};

use ytsaurus_operator::controller::{advance, ComponentManager};
use ytsaurus_operator::crd::{ExecNodesSpec, InstanceSpec, YtsaurusSpec, YtsaurusStatus};
use ytsaurus_operator::resources::MemoryStore;

pub const NS: &str = "yt";
pub const CLUSTER: &str = "prod";

/// A cluster with one master and the given exec node pools
pub fn cluster_spec(image: &str, pools: &[&str]) -> YtsaurusSpec {
    YtsaurusSpec {
        core_image: image.to_string(),
        image_pull_secrets: vec![],
        masters: InstanceSpec {
            instance_count: 1,
            ..Default::default()
        },
        exec_nodes: pools
            .iter()
            .map(|name| ExecNodesSpec {
                name: name.to_string(),
                instance: InstanceSpec {
                    instance_count: 1,
                    ..Default::default()
                },
                sidecars: vec![],
            })
            .collect(),
        ui: None,
        config_overrides: None,
    }
}

/// A freshly wired and fetched manager, as a reconcile builds it
pub async fn manager(spec: &YtsaurusSpec, store: &Arc<MemoryStore>) -> ComponentManager {
    let mut manager = ComponentManager::for_cluster(CLUSTER, NS, spec, store.clone())
        .expect("components wire up");
    manager.fetch().await.expect("fetch succeeds");
    manager
}

/// One reconcile tick over the persisted status
pub async fn tick(
    spec: &YtsaurusSpec,
    store: &Arc<MemoryStore>,
    status: &YtsaurusStatus,
) -> YtsaurusStatus {
    let manager = manager(spec, store).await;
    advance(&manager, status).await.expect("tick succeeds")
}

/// Report every replica of the named stateful sets as ready, if they exist
pub fn mark_ready(store: &MemoryStore, workloads: &[&str]) {
    for name in workloads {
        store.edit::<StatefulSet>(NS, name, |sts| {
            let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            sts.status = Some(StatefulSetStatus {
                ready_replicas: Some(replicas),
                replicas,
                ..Default::default()
            });
        });
    }
}

/// Image of the first container of a stateful set
pub fn image_of(store: &MemoryStore, workload: &str) -> Option<String> {
    let sts: StatefulSet = store.object(NS, workload)?;
    sts.spec?.template.spec?.containers.first()?.image.clone()
}
