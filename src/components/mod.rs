//! Cluster components and their reconcile contract
//!
//! A component is one independently reconcilable part of a cluster (the
//! masters, one exec node pool, the web UI, a SPYT release). Each tick the
//! outer loop builds a fresh set of components and drives them through:
//!
//! 1. [`Component::fetch`] - load observed state of every owned object
//! 2. [`Component::status`] - dry pass, no writes
//! 3. [`Component::sync`] - wet pass, applies what the dry pass decided
//!
//! `status` and `sync` run the same decision function with a `dry` flag, so
//! the dry pass takes exactly the branch the wet pass would. A component never
//! reports `Ready` while `sync` would still write something.

mod config_helper;
mod exec_node;
mod init_job;
mod master;
mod microservice;
mod server;
mod spyt;
mod status;
mod ui;

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::error;

use crate::crd::{ClusterState, UpdateState, YtsaurusStatus};
use crate::Error;

pub use config_helper::ConfigHelper;
pub use exec_node::ExecNode;
pub use init_job::{create_user_command, native_driver_prologue, InitJob};
pub use master::Master;
pub use microservice::{Microservice, MicroserviceSpec};
pub use server::parse_sidecars;
pub use spyt::Spyt;
pub use status::{ComponentStatus, SyncStatus};
pub use ui::Ui;

/// Status reason reported while replicas are being deleted for an update
pub const REASON_PODS_REMOVAL: &str = "pods removal";

/// Result of one decision pass: the status plus any error hit while applying
pub type Outcome = (ComponentStatus, Result<(), Error>);

/// Cluster-wide state every component reads during a tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSnapshot {
    /// Coarse lifecycle phase
    pub state: ClusterState,
    /// Update sub-phase; only meaningful while `state` is `Updating`
    pub update_state: UpdateState,
    /// Components in scope of a local update, `None` for cluster-wide
    pub local_updating_components: Option<Vec<String>>,
}

impl ClusterSnapshot {
    /// Snapshot of a persisted cluster status
    pub fn from_status(status: Option<&YtsaurusStatus>) -> Self {
        match status {
            Some(s) => Self {
                state: s.state,
                update_state: s.update_status.state,
                local_updating_components: s.update_status.components.clone(),
            },
            None => Self::default(),
        }
    }

    /// Snapshot of a cluster in the given phase with no update in progress
    pub fn in_state(state: ClusterState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Whether the cluster is running
    pub fn is_running(&self) -> bool {
        self.state == ClusterState::Running
    }

    /// The update sub-phase, or `None` outside of `Updating`
    pub fn update_state(&self) -> Option<UpdateState> {
        (self.state == ClusterState::Updating).then_some(self.update_state)
    }

    /// Whether the named component must delete its replicas now
    pub fn is_removing_pods_of(&self, component: &str) -> bool {
        if self.update_state() != Some(UpdateState::WaitingForPodsRemoval) {
            return false;
        }
        match &self.local_updating_components {
            None => true,
            Some(names) => names.iter().any(|n| n == component),
        }
    }
}

/// Statuses computed so far in the current tick, keyed by component name
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    statuses: HashMap<String, ComponentStatus>,
}

impl StatusBoard {
    /// Record the fresh status of a component
    pub fn record(&mut self, name: impl Into<String>, status: ComponentStatus) {
        self.statuses.insert(name.into(), status);
    }

    /// Latest status of a component
    pub fn get(&self, name: &str) -> Option<&ComponentStatus> {
        self.statuses.get(name)
    }

    /// First dependency not yet ready; a dependency without a status counts as not ready
    pub fn blocker<'a>(&self, dependencies: &'a [String]) -> Option<&'a str> {
        dependencies
            .iter()
            .find(|d| !self.get(d).is_some_and(ComponentStatus::is_ready))
            .map(String::as_str)
    }
}

/// Everything a component's decision function may read besides its own objects
#[derive(Clone, Debug, Default)]
pub struct SyncContext {
    /// Cluster-wide state
    pub cluster: ClusterSnapshot,
    /// Statuses of components already evaluated this tick
    pub board: StatusBoard,
}

impl SyncContext {
    /// Context with an empty status board
    pub fn new(cluster: ClusterSnapshot) -> Self {
        Self {
            cluster,
            board: StatusBoard::default(),
        }
    }
}

/// Uniform lifecycle of a cluster component
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable component name, e.g. `ExecNode-gpu`
    fn name(&self) -> &str;

    /// Names of components that must be `Ready` before this one proceeds
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Load observed state of every owned object
    async fn fetch(&mut self) -> Result<(), Error>;

    /// Dry pass; an error here is an invariant violation
    async fn status(&self, ctx: &SyncContext) -> Result<ComponentStatus, Error>;

    /// Wet pass
    async fn sync(&self, ctx: &SyncContext) -> Result<(), Error>;
}

/// Turn the outcome of a dry pass into a status.
///
/// A dry pass never writes, so it has nothing that may fail; an error means
/// the decision function is broken and the invocation must stop.
pub(crate) fn dry_status(component: &str, outcome: Outcome) -> Result<ComponentStatus, Error> {
    match outcome {
        (status, Ok(())) => Ok(status),
        (_, Err(e)) => {
            error!(component, error = %e, "dry pass returned an error");
            Err(Error::invariant_violation(component, &e))
        }
    }
}
