//! Reconciliation outcomes

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Outcome of one reconcile pass over a component
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Nothing left to do; dependents may proceed
    Ready,
    /// A change was applied or is in flight
    #[default]
    Pending,
    /// Waiting on a dependency or on an external fix
    Blocked,
    /// Inside a rolling-update sub-phase
    Updating,
    /// The running workload is out of date while the cluster is running.
    ///
    /// This is a signal to the outer loop to start an update; the component
    /// never acts on it by itself.
    NeedLocalUpdate,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Pending => write!(f, "Pending"),
            Self::Blocked => write!(f, "Blocked"),
            Self::Updating => write!(f, "Updating"),
            Self::NeedLocalUpdate => write!(f, "NeedLocalUpdate"),
        }
    }
}

/// Status of a component with an optional human-readable reason
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentStatus {
    /// The outcome
    pub sync_status: SyncStatus,
    /// What the component waits on, if anything
    pub reason: Option<String>,
}

impl ComponentStatus {
    /// Status without a reason
    pub fn simple(sync_status: SyncStatus) -> Self {
        Self {
            sync_status,
            reason: None,
        }
    }

    /// Status waiting on something named by `reason`
    pub fn waiting(sync_status: SyncStatus, reason: impl Into<String>) -> Self {
        Self {
            sync_status,
            reason: Some(reason.into()),
        }
    }

    /// Shorthand for `simple(SyncStatus::Ready)`
    pub fn ready() -> Self {
        Self::simple(SyncStatus::Ready)
    }

    /// Whether dependents may proceed
    pub fn is_ready(&self) -> bool {
        self.sync_status == SyncStatus::Ready
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({reason})", self.sync_status),
            None => write!(f, "{}", self.sync_status),
        }
    }
}
