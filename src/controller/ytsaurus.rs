//! Ytsaurus controller implementation
//!
//! Each reconcile wires a fresh [`ComponentManager`] from the current spec,
//! evaluates every component, and advances the cluster state machine:
//!
//! ```text
//! Created/Initializing --all ready--> Running
//! Running --any NeedLocalUpdate--> Updating/WaitingForPodsRemoval
//! WaitingForPodsRemoval --replicas removed--> WaitingForPodsCreation
//! WaitingForPodsCreation --all ready--> Running
//! ```
//!
//! The status sub-resource is the only state carried between ticks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::ComponentManager;
use crate::components::{ClusterSnapshot, SyncContext, SyncStatus};
use crate::crd::{
    ClusterState, Spyt, SpytStatus, UpdateState, UpdateStatus, Ytsaurus, YtsaurusStatus,
};
use crate::resources::{KubeObjectStore, ObjectStore};
use crate::{Error, FIELD_MANAGER};

/// Default interval between reconciles of a healthy resource
pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(10);

/// Default interval before retrying a failed reconcile
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Trait abstracting Kubernetes client operations on the operator's own resources
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Patch the status of a Ytsaurus resource
    async fn patch_ytsaurus_status(
        &self,
        namespace: &str,
        name: &str,
        status: &YtsaurusStatus,
    ) -> Result<(), Error>;

    /// Patch the status of a Spyt resource
    async fn patch_spyt_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SpytStatus,
    ) -> Result<(), Error>;

    /// Read a Ytsaurus resource, `None` if it does not exist
    async fn get_ytsaurus(&self, namespace: &str, name: &str) -> Result<Option<Ytsaurus>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn patch_ytsaurus_status(
        &self,
        namespace: &str,
        name: &str,
        status: &YtsaurusStatus,
    ) -> Result<(), Error> {
        let api: Api<Ytsaurus> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_patch(status);
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_spyt_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SpytStatus,
    ) -> Result<(), Error> {
        let api: Api<Spyt> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_patch(status);
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_ytsaurus(&self, namespace: &str, name: &str) -> Result<Option<Ytsaurus>, Error> {
        let api: Api<Ytsaurus> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Merge patch body replacing a status sub-resource.
///
/// Status types serialize cleared optional fields as `null`, which a JSON
/// merge patch turns into a removal.
fn status_patch<S: Serialize>(status: &S) -> serde_json::Value {
    serde_json::json!({ "status": status })
}

/// Controller context shared by every reconcile
pub struct Context {
    /// Access to the operator's own resources
    pub kube: Arc<dyn KubeClient>,
    /// Access to objects owned by components
    pub store: Arc<dyn ObjectStore>,
    /// Requeue interval after a successful reconcile
    pub requeue: Duration,
    /// Requeue interval after a failed reconcile
    pub error_requeue: Duration,
}

impl Context {
    /// Create a context backed by a live cluster
    pub fn new(client: Client) -> Self {
        Self {
            kube: Arc::new(KubeClientImpl::new(client.clone())),
            store: Arc::new(KubeObjectStore::new(client)),
            requeue: DEFAULT_REQUEUE,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }

    /// Override the requeue intervals
    pub fn with_intervals(mut self, requeue: Duration, error_requeue: Duration) -> Self {
        self.requeue = requeue;
        self.error_requeue = error_requeue;
        self
    }

    /// Create a context with custom clients for testing
    pub fn for_testing(kube: Arc<dyn KubeClient>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            kube,
            store,
            requeue: DEFAULT_REQUEUE,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }
}

/// Reconcile a Ytsaurus resource
#[instrument(skip(ytsaurus, ctx), fields(ytsaurus = %ytsaurus.name_any()))]
pub async fn reconcile(ytsaurus: Arc<Ytsaurus>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = ytsaurus.name_any();
    let namespace = ytsaurus
        .namespace()
        .ok_or_else(|| Error::validation("Ytsaurus must be namespaced"))?;
    let current = ytsaurus.status.clone().unwrap_or_default();

    let mut spec = ytsaurus.spec.clone();
    spec.apply_defaults();
    if let Err(e) = spec.validate() {
        warn!(error = %e, "ytsaurus validation failed");
        let failed = current.clone().message(e.to_string());
        if failed != current {
            ctx.kube
                .patch_ytsaurus_status(&namespace, &name, &failed)
                .await?;
        }
        return Ok(Action::await_change());
    }

    let mut manager = ComponentManager::for_cluster(&name, &namespace, &spec, ctx.store.clone())?;
    manager.fetch().await?;
    let next = advance(&manager, &current).await?;

    if next != current {
        info!(
            from = %current.state,
            to = %next.state,
            update_state = %next.update_status.state,
            "updating cluster status"
        );
        ctx.kube
            .patch_ytsaurus_status(&namespace, &name, &next)
            .await?;
    }

    Ok(Action::requeue(ctx.requeue))
}

/// One tick of the cluster state machine over fetched components.
///
/// Returns the status to persist.
pub async fn advance(
    manager: &ComponentManager,
    current: &YtsaurusStatus,
) -> Result<YtsaurusStatus, Error> {
    let snapshot = ClusterSnapshot::from_status(Some(current));
    let tick = manager.status(snapshot).await?;
    debug!(state = %current.state, "cluster components evaluated");

    let next = match current.state {
        ClusterState::Running => running(manager, current, &tick).await?,
        ClusterState::Updating => updating(manager, current, &tick).await?,
        ClusterState::Created | ClusterState::Initializing => {
            if manager.all_ready(&tick) {
                info!("all components ready");
                YtsaurusStatus::with_state(ClusterState::Running)
            } else {
                manager.sync(&tick).await?;
                YtsaurusStatus::with_state(ClusterState::Initializing)
            }
        }
    };

    Ok(with_summary(next, manager, &tick))
}

async fn running(
    manager: &ComponentManager,
    current: &YtsaurusStatus,
    tick: &SyncContext,
) -> Result<YtsaurusStatus, Error> {
    let outdated = manager.with_status(tick, SyncStatus::NeedLocalUpdate);
    if !outdated.is_empty() {
        info!(components = ?outdated, "starting update");
        return Ok(YtsaurusStatus {
            state: ClusterState::Updating,
            update_status: UpdateStatus {
                state: UpdateState::WaitingForPodsRemoval,
                components: Some(outdated),
            },
            message: None,
        });
    }

    if !manager.all_ready(tick) {
        manager.sync(tick).await?;
    }
    Ok(current.clone())
}

async fn updating(
    manager: &ComponentManager,
    current: &YtsaurusStatus,
    tick: &SyncContext,
) -> Result<YtsaurusStatus, Error> {
    let mut next = current.clone();
    match current.update_status.state {
        UpdateState::WaitingForPodsRemoval => {
            manager.sync(tick).await?;

            let all_removing = manager
                .names()
                .into_iter()
                .filter(|n| tick.cluster.is_removing_pods_of(n))
                .all(|n| {
                    tick.board
                        .get(n)
                        .is_some_and(|s| s.sync_status == SyncStatus::Updating)
                });
            if all_removing {
                info!("replicas removed, recreating");
                next.update_status.state = UpdateState::WaitingForPodsCreation;
            }
        }
        UpdateState::WaitingForPodsCreation => {
            if manager.all_ready(tick) {
                info!("update finished");
                return Ok(YtsaurusStatus::with_state(ClusterState::Running));
            }
            manager.sync(tick).await?;
        }
        other => {
            debug!(update_state = %other, "entering pods removal");
            next.update_status.state = UpdateState::WaitingForPodsRemoval;
        }
    }
    Ok(next)
}

fn with_summary(
    mut status: YtsaurusStatus,
    manager: &ComponentManager,
    tick: &SyncContext,
) -> YtsaurusStatus {
    status.message = manager.summary(tick);
    status
}

/// Error policy for the Ytsaurus controller
pub fn error_policy(ytsaurus: Arc<Ytsaurus>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_invariant_violation() {
        error!(
            ?error,
            ytsaurus = %ytsaurus.name_any(),
            "reconcile aborted on invariant violation"
        );
    } else {
        warn!(
            error = %error,
            ytsaurus = %ytsaurus.name_any(),
            "reconciliation failed"
        );
    }
    Action::requeue(ctx.error_requeue)
}
