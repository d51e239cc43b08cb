//! Stories about how the cluster state machine drives its components
//!
//! Each test replays the reconcile loop tick by tick: a fresh manager is
//! wired from the spec, fetched, and advanced over the status persisted by
//! the previous tick. Replicas become ready only when the test says so.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;

use ytsaurus_operator::crd::{ClusterState, UpdateState, UpdateStatus, YtsaurusStatus};
use ytsaurus_operator::resources::memory::Mutation;
use ytsaurus_operator::resources::MemoryStore;

use super::helpers::{cluster_spec, image_of, mark_ready, tick, NS};

/// Install a single-pool cluster and return the store once it is Running
async fn installed(image: &str, pools: &[&str], workloads: &[&str]) -> (Arc<MemoryStore>, YtsaurusStatus) {
    let store = Arc::new(MemoryStore::new());
    let spec = cluster_spec(image, pools);
    let mut status = YtsaurusStatus::default();
    for _ in 0..pools.len() + 3 {
        status = tick(&spec, &store, &status).await;
        mark_ready(&store, workloads);
    }
    assert_eq!(status.state, ClusterState::Running);
    (store, status)
}

// =============================================================================
// First install
// =============================================================================

/// Story: masters come up first, exec nodes follow once masters are ready
#[tokio::test]
async fn story_first_install_brings_up_masters_before_exec_nodes() {
    let store = Arc::new(MemoryStore::new());
    let spec = cluster_spec("yt:23.2", &["default"]);

    // Tick 1: only the masters are created
    let status = tick(&spec, &store, &YtsaurusStatus::default()).await;
    assert_eq!(status.state, ClusterState::Initializing);
    assert!(store.contains::<StatefulSet>(NS, "ms"));
    assert!(store.contains::<Service>(NS, "masters"));
    assert!(!store.contains::<StatefulSet>(NS, "end"));
    assert_eq!(
        status.message.as_deref(),
        Some("Master: Pending (components), ExecNode: Blocked (Master)")
    );

    // Tick 2: master pods are not ready yet, nothing more happens
    store.clear_mutations();
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Initializing);
    assert_eq!(store.mutation_count(), 0);

    // Tick 3: masters ready, exec nodes are created
    mark_ready(&store, &["ms"]);
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Initializing);
    assert!(store.contains::<StatefulSet>(NS, "end"));
    assert_eq!(image_of(&store, "end").as_deref(), Some("yt:23.2"));

    // Tick 4: everything ready
    mark_ready(&store, &["end"]);
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Running);
    assert_eq!(status.message, None);
}

/// Story: a converged cluster issues no writes on later ticks
#[tokio::test]
async fn story_running_cluster_is_left_alone() {
    let (store, status) = installed("yt:1", &["default"], &["ms", "end"]).await;
    store.clear_mutations();

    let next = tick(&cluster_spec("yt:1", &["default"]), &store, &status).await;
    assert_eq!(next, status);
    assert_eq!(store.mutation_count(), 0);
}

// =============================================================================
// Rolling updates
// =============================================================================

/// Story: a new core image rolls every component through pods removal
///
/// Running sees NeedLocalUpdate and enters the update; the removal phase
/// deletes every replica group; the creation phase brings them back with
/// the new image in dependency order; the update ends in Running with the
/// update status cleared.
#[tokio::test]
async fn story_core_image_change_rolls_the_whole_cluster() {
    let (store, status) = installed("yt:1", &["default"], &["ms", "end"]).await;
    let spec = cluster_spec("yt:2", &["default"]);

    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Updating);
    assert_eq!(status.update_status.state, UpdateState::WaitingForPodsRemoval);
    assert_eq!(
        status.update_status.components,
        Some(vec!["Master".to_string(), "ExecNode".to_string()])
    );
    // entering the update writes nothing
    assert_eq!(image_of(&store, "ms").as_deref(), Some("yt:1"));

    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.update_status.state, UpdateState::WaitingForPodsCreation);
    assert!(!store.contains::<StatefulSet>(NS, "ms"));
    assert!(!store.contains::<StatefulSet>(NS, "end"));
    assert!(store.contains::<Service>(NS, "masters"));

    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Updating);
    assert_eq!(image_of(&store, "ms").as_deref(), Some("yt:2"));
    assert!(!store.contains::<StatefulSet>(NS, "end"));

    mark_ready(&store, &["ms"]);
    let status = tick(&spec, &store, &status).await;
    assert_eq!(image_of(&store, "end").as_deref(), Some("yt:2"));

    mark_ready(&store, &["end"]);
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Running);
    assert_eq!(status.update_status, UpdateStatus::default());
}

/// Story: an image override on one pool only touches that pool
#[tokio::test]
async fn story_pool_image_override_is_a_scoped_update() {
    let workloads = ["ms", "end-a", "end-b"];
    let (store, status) = installed("yt:1", &["a", "b"], &workloads).await;
    let mut spec = cluster_spec("yt:1", &["a", "b"]);
    spec.exec_nodes[0].instance.image = Some("yt:1-hotfix".to_string());

    let status = tick(&spec, &store, &status).await;
    assert_eq!(
        status.update_status.components,
        Some(vec!["ExecNode-a".to_string()])
    );

    store.clear_mutations();
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.update_status.state, UpdateState::WaitingForPodsCreation);
    let deleted: Vec<String> = store
        .mutations()
        .iter()
        .filter_map(|m| match m {
            Mutation::Delete(key) => Some(key.name.clone()),
            Mutation::Apply(_) => None,
        })
        .collect();
    assert_eq!(deleted, vec!["end-a".to_string()]);
    assert_eq!(image_of(&store, "end-b").as_deref(), Some("yt:1"));

    let status = tick(&spec, &store, &status).await;
    assert_eq!(image_of(&store, "end-a").as_deref(), Some("yt:1-hotfix"));

    mark_ready(&store, &workloads);
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Running);
    assert_eq!(image_of(&store, "ms").as_deref(), Some("yt:1"));
}

/// Story: a replica count change is applied in place without an update phase
#[tokio::test]
async fn story_scaling_is_not_an_update() {
    let (store, status) = installed("yt:1", &["default"], &["ms", "end"]).await;
    let mut spec = cluster_spec("yt:1", &["default"]);
    spec.exec_nodes[0].instance.instance_count = 3;

    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.state, ClusterState::Running);
    let end: StatefulSet = store.object(NS, "end").unwrap();
    assert_eq!(end.spec.unwrap().replicas, Some(3));

    mark_ready(&store, &["end"]);
    let status = tick(&spec, &store, &status).await;
    assert_eq!(status.message, None);
}
