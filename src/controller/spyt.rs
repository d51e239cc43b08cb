//! Spyt controller implementation
//!
//! Publishes a SPYT release into the Ytsaurus cluster named by the resource.
//! The release pipeline is gated on that cluster's persisted state.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use super::{ComponentManager, Context};
use crate::components::{self, ClusterSnapshot, Component, SyncStatus};
use crate::crd::{Spyt, SpytStatus};
use crate::ytconfig::Generator;
use crate::Error;

/// Reconcile a Spyt resource
#[instrument(skip(spyt, ctx), fields(spyt = %spyt.name_any()))]
pub async fn reconcile_spyt(spyt: Arc<Spyt>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = spyt.name_any();
    let namespace = spyt
        .namespace()
        .ok_or_else(|| Error::validation("Spyt must be namespaced"))?;
    let current = spyt.status.clone().unwrap_or_default();

    let Some(ytsaurus) = ctx.kube.get_ytsaurus(&namespace, &spyt.spec.ytsaurus).await? else {
        warn!(ytsaurus = %spyt.spec.ytsaurus, "referenced ytsaurus not found");
        let next = SpytStatus {
            release_status: SyncStatus::Blocked,
            reason: Some(format!("ytsaurus {} not found", spyt.spec.ytsaurus)),
        };
        if next != current {
            ctx.kube.patch_spyt_status(&namespace, &name, &next).await?;
        }
        return Ok(Action::requeue(ctx.requeue));
    };

    let cfgen = Arc::new(Generator::new(
        ytsaurus.name_any(),
        namespace.clone(),
        ytsaurus.spec.clone(),
    ));
    let release = components::Spyt::new(&spyt, &ytsaurus, &cfgen, ctx.store.clone());
    let component_name = release.name().to_string();

    let mut manager = ComponentManager::new(vec![Box::new(release)])?;
    manager.fetch().await?;
    let tick = manager
        .status(ClusterSnapshot::from_status(ytsaurus.status.as_ref()))
        .await?;
    if !manager.all_ready(&tick) {
        manager.sync(&tick).await?;
    }

    let next = match tick.board.get(&component_name) {
        Some(status) => SpytStatus {
            release_status: status.sync_status,
            reason: status.reason.clone(),
        },
        None => current.clone(),
    };
    if next != current {
        info!(release_status = %next.release_status, "updating spyt status");
        ctx.kube.patch_spyt_status(&namespace, &name, &next).await?;
    }

    Ok(Action::requeue(ctx.requeue))
}

/// Error policy for the Spyt controller
pub fn error_policy_spyt(spyt: Arc<Spyt>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        error = %error,
        spyt = %spyt.name_any(),
        "spyt reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}
