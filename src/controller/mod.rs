//! Controller implementations for YTsaurus CRDs
//!
//! This module contains the reconciliation logic for the Ytsaurus and Spyt
//! custom resources. Both controllers rebuild their components from scratch
//! every tick and persist progress only through the status sub-resource.

mod manager;
mod spyt;
mod ytsaurus;

pub use manager::ComponentManager;
pub use spyt::{error_policy_spyt, reconcile_spyt};
pub use ytsaurus::{
    advance, error_policy, reconcile, Context, KubeClient, KubeClientImpl, DEFAULT_ERROR_REQUEUE,
    DEFAULT_REQUEUE,
};

#[cfg(test)]
pub use ytsaurus::MockKubeClient;
