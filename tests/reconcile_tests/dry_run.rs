//! Stories about the status pass
//!
//! The status pass runs the same decisions as sync with writes switched
//! off. It must never touch the store, and whatever it reports must match
//! what a sync right after it actually does.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;

use ytsaurus_operator::components::{ClusterSnapshot, SyncStatus};
use ytsaurus_operator::crd::{ClusterState, UpdateState, YtsaurusSpec};
use ytsaurus_operator::resources::MemoryStore;

use super::helpers::{cluster_spec, manager, mark_ready, NS};

fn snapshot(state: ClusterState, update_state: UpdateState) -> ClusterSnapshot {
    ClusterSnapshot {
        state,
        update_state,
        local_updating_components: None,
    }
}

fn phases() -> Vec<ClusterSnapshot> {
    vec![
        snapshot(ClusterState::Created, UpdateState::None),
        snapshot(ClusterState::Initializing, UpdateState::None),
        snapshot(ClusterState::Running, UpdateState::None),
        snapshot(ClusterState::Updating, UpdateState::WaitingForPodsRemoval),
        snapshot(ClusterState::Updating, UpdateState::WaitingForPodsCreation),
    ]
}

/// Seed a store holding a ready cluster built from `spec`
async fn ready_store(spec: &YtsaurusSpec) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for _ in 0..3 {
        let m = manager(spec, &store).await;
        let ctx = m
            .status(ClusterSnapshot::in_state(ClusterState::Initializing))
            .await
            .unwrap();
        m.sync(&ctx).await.unwrap();
        mark_ready(&store, &["ms", "end"]);
    }
    store
}

/// Story: the status pass never writes, in any phase, from any starting point
#[tokio::test]
async fn story_status_pass_is_read_only() {
    let spec = cluster_spec("yt:1", &["default"]);
    let stores = [
        Arc::new(MemoryStore::new()),
        ready_store(&spec).await,
        ready_store(&cluster_spec("yt:0", &["default"])).await,
    ];

    for store in &stores {
        for phase in phases() {
            store.clear_mutations();
            let m = manager(&spec, store).await;
            m.status(phase.clone()).await.unwrap();
            assert_eq!(store.mutation_count(), 0, "status wrote in {phase:?}");
        }
    }
}

/// Story: components reported Ready are not touched by the following sync
#[tokio::test]
async fn story_ready_means_nothing_to_do() {
    let spec = cluster_spec("yt:1", &["default"]);
    let store = ready_store(&spec).await;

    for phase in [
        snapshot(ClusterState::Running, UpdateState::None),
        snapshot(ClusterState::Updating, UpdateState::WaitingForPodsCreation),
    ] {
        let m = manager(&spec, &store).await;
        let ctx = m.status(phase).await.unwrap();
        assert!(m.all_ready(&ctx));

        store.clear_mutations();
        m.sync(&ctx).await.unwrap();
        assert_eq!(store.mutation_count(), 0);
    }
}

/// Story: the reported status names the work the sync performs
#[tokio::test]
async fn story_status_predicts_sync() {
    let spec = cluster_spec("yt:2", &["default"]);
    let store = ready_store(&cluster_spec("yt:1", &["default"])).await;

    // Pods removal is reported as Updating and performed by the sync
    let m = manager(&spec, &store).await;
    let ctx = m
        .status(snapshot(ClusterState::Updating, UpdateState::WaitingForPodsRemoval))
        .await
        .unwrap();
    assert_eq!(m.with_status(&ctx, SyncStatus::Updating), vec!["Master", "ExecNode"]);
    assert_eq!(store.mutation_count(), 0);
    m.sync(&ctx).await.unwrap();
    assert!(!store.contains::<StatefulSet>(NS, "ms"));
    assert!(!store.contains::<StatefulSet>(NS, "end"));

    // Missing replicas are reported as Pending and created by the sync
    let m = manager(&spec, &store).await;
    let ctx = m
        .status(snapshot(ClusterState::Updating, UpdateState::WaitingForPodsCreation))
        .await
        .unwrap();
    assert_eq!(m.with_status(&ctx, SyncStatus::Pending), vec!["Master"]);
    assert_eq!(m.with_status(&ctx, SyncStatus::Blocked), vec!["ExecNode"]);
    m.sync(&ctx).await.unwrap();
    assert!(store.contains::<StatefulSet>(NS, "ms"));
    assert!(!store.contains::<StatefulSet>(NS, "end"));
}

/// Story: a malformed sidecar blocks its pool in both passes and writes nothing
#[tokio::test]
async fn story_invalid_sidecar_blocks_the_pool() {
    let good = cluster_spec("yt:1", &["default"]);
    let store = ready_store(&good).await;

    let mut spec = good.clone();
    spec.exec_nodes[0].sidecars = vec!["name: [unterminated".to_string()];
    spec.exec_nodes[0].instance.instance_count = 2;

    let m = manager(&spec, &store).await;
    let ctx = m
        .status(ClusterSnapshot::in_state(ClusterState::Running))
        .await
        .unwrap();
    let status = ctx.board.get("ExecNode").unwrap();
    assert_eq!(status.sync_status, SyncStatus::Blocked);
    assert_eq!(status.reason.as_deref(), Some("invalid sidecar"));

    store.clear_mutations();
    m.sync(&ctx).await.unwrap();
    assert_eq!(store.mutation_count(), 0);
}
