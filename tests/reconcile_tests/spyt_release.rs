//! Stories about publishing a SPYT release
//!
//! The release pipeline runs one step per tick: token secret, user job,
//! environment job. Job completion is simulated by editing job status.

use std::sync::Arc;

use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::Secret;

use ytsaurus_operator::components::{self, ClusterSnapshot, ComponentStatus, SyncStatus};
use ytsaurus_operator::controller::ComponentManager;
use ytsaurus_operator::crd::{ClusterState, Spyt, SpytSpec, Ytsaurus};
use ytsaurus_operator::resources::MemoryStore;
use ytsaurus_operator::ytconfig::Generator;
use ytsaurus_operator::TOKEN_SECRET_KEY;

use super::helpers::{cluster_spec, CLUSTER, NS};

const SECRET: &str = "ytsaurus-spyt-3-2-secret";
const USER_JOB: &str = "ytsaurus-spyt-3-2-init-job-user";
const ENV_JOB: &str = "ytsaurus-spyt-3-2-init-job-spyt-environment";

fn resources() -> (Spyt, Ytsaurus) {
    let mut spyt = Spyt::new(
        "spyt",
        SpytSpec {
            name: "3-2".to_string(),
            image: "spyt:3.2".to_string(),
            ytsaurus: CLUSTER.to_string(),
        },
    );
    spyt.metadata.namespace = Some(NS.to_string());
    let mut ytsaurus = Ytsaurus::new(CLUSTER, cluster_spec("yt:1", &[]));
    ytsaurus.metadata.namespace = Some(NS.to_string());
    (spyt, ytsaurus)
}

/// One tick of the release pipeline, returning the reported status
async fn tick(store: &Arc<MemoryStore>, state: ClusterState) -> ComponentStatus {
    let (spyt, ytsaurus) = resources();
    let cfgen = Arc::new(Generator::new(CLUSTER, NS, ytsaurus.spec.clone()));
    let release = components::Spyt::new(&spyt, &ytsaurus, &cfgen, store.clone());

    let mut manager = ComponentManager::new(vec![Box::new(release)]).unwrap();
    manager.fetch().await.unwrap();
    let ctx = manager.status(ClusterSnapshot::in_state(state)).await.unwrap();
    manager.sync(&ctx).await.unwrap();
    ctx.board.get("SPYT-3-2").cloned().unwrap()
}

fn finish(store: &MemoryStore, job: &str, condition: &str) {
    assert!(store.edit::<Job>(NS, job, |j| {
        j.status = Some(JobStatus {
            conditions: Some(vec![JobCondition {
                type_: condition.to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }));
}

/// Story: a release goes from token to published across ticks
#[tokio::test]
async fn story_release_is_published_step_by_step() {
    let store = Arc::new(MemoryStore::new());

    // Nothing happens while the cluster is still coming up
    let status = tick(&store, ClusterState::Initializing).await;
    assert_eq!(status, ComponentStatus::waiting(SyncStatus::Blocked, CLUSTER));
    assert_eq!(store.mutation_count(), 0);

    let status = tick(&store, ClusterState::Running).await;
    assert_eq!(status, ComponentStatus::waiting(SyncStatus::Pending, SECRET));
    let secret: Secret = store.object(NS, SECRET).unwrap();
    let token = secret.string_data.unwrap()[TOKEN_SECRET_KEY].clone();

    let status = tick(&store, ClusterState::Running).await;
    assert_eq!(status, ComponentStatus::waiting(SyncStatus::Pending, USER_JOB));
    assert!(store.contains::<Job>(NS, USER_JOB));

    let status = tick(&store, ClusterState::Running).await;
    assert_eq!(status, ComponentStatus::waiting(SyncStatus::Blocked, USER_JOB));
    assert!(!store.contains::<Job>(NS, ENV_JOB));

    finish(&store, USER_JOB, "Complete");
    let status = tick(&store, ClusterState::Running).await;
    assert_eq!(status, ComponentStatus::waiting(SyncStatus::Pending, ENV_JOB));

    finish(&store, ENV_JOB, "Complete");
    store.clear_mutations();
    let status = tick(&store, ClusterState::Running).await;
    assert!(status.is_ready());
    assert_eq!(store.mutation_count(), 0);

    // the token survives every tick
    let secret: Secret = store.object(NS, SECRET).unwrap();
    assert_eq!(secret.string_data.unwrap()[TOKEN_SECRET_KEY], token);
}

/// Story: a failed user job stops the pipeline until someone intervenes
#[tokio::test]
async fn story_failed_job_blocks_the_release() {
    let store = Arc::new(MemoryStore::new());
    tick(&store, ClusterState::Running).await;
    tick(&store, ClusterState::Running).await;

    finish(&store, USER_JOB, "Failed");
    store.clear_mutations();
    let status = tick(&store, ClusterState::Running).await;
    assert_eq!(status, ComponentStatus::waiting(SyncStatus::Blocked, "job failed"));
    assert_eq!(store.mutation_count(), 0);
    assert!(!store.contains::<Job>(NS, ENV_JOB));
}
