//! Decision function shared by components backed by one [`Microservice`]

use k8s_openapi::api::core::v1::Container;
use tracing::{debug, warn};

use super::{ComponentStatus, Microservice, Outcome, SyncContext, SyncStatus, REASON_PODS_REMOVAL};
use crate::resources::ReplicaGroup;

/// Parse sidecar container definitions given as YAML strings
pub fn parse_sidecars(sidecars: &[String]) -> Result<Vec<Container>, serde_yaml::Error> {
    sidecars.iter().map(|s| serde_yaml::from_str(s)).collect()
}

/// Reconcile a workload-backed component.
///
/// First matching rule wins:
/// 1. running cluster and an out-of-date image: `NeedLocalUpdate`
/// 2. pods-removal phase covering this component: delete replicas, `Updating`
/// 3. an upstream not ready: `Blocked(<upstream>)`
/// 4. a malformed sidecar or config override: `Blocked`, nothing written
/// 5. drift, sidecars included: apply, `Pending("components")`
/// 6. replicas not ready: `Blocked("pods")`
/// 7. `Ready`
///
/// Nothing is written when `dry` is set; the same rule is still selected.
pub(crate) async fn reconcile_workload<W: ReplicaGroup>(
    name: &str,
    server: &Microservice<W>,
    dependencies: &[String],
    sidecars: &[String],
    ctx: &SyncContext,
    dry: bool,
) -> Outcome {
    if ctx.cluster.is_running() && server.need_local_update() {
        return (ComponentStatus::simple(SyncStatus::NeedLocalUpdate), Ok(()));
    }

    if ctx.cluster.is_removing_pods_of(name) {
        let result = if dry { Ok(()) } else { server.remove_pods().await };
        return (
            ComponentStatus::waiting(SyncStatus::Updating, REASON_PODS_REMOVAL),
            result,
        );
    }

    if let Some(upstream) = ctx.board.blocker(dependencies) {
        debug!(component = name, upstream, "waiting for upstream component");
        return (ComponentStatus::waiting(SyncStatus::Blocked, upstream), Ok(()));
    }

    // Sidecars are part of the desired pod; a bad one leaves everything untouched.
    let extra = match parse_sidecars(sidecars) {
        Ok(extra) => extra,
        Err(e) => {
            warn!(component = name, error = %e, "invalid sidecar definition");
            return (
                ComponentStatus::waiting(SyncStatus::Blocked, "invalid sidecar"),
                Ok(()),
            );
        }
    };

    if let Err(e) = server.check_config_overrides() {
        warn!(component = name, error = %e, "invalid config override");
        return (
            ComponentStatus::waiting(SyncStatus::Blocked, "invalid config override"),
            Ok(()),
        );
    }

    if server.need_sync(&extra) {
        let result = if dry { Ok(()) } else { server.sync(&extra).await };
        return (
            ComponentStatus::waiting(SyncStatus::Pending, "components"),
            result,
        );
    }

    if !server.are_pods_ready() {
        return (ComponentStatus::waiting(SyncStatus::Blocked, "pods"), Ok(()));
    }

    (ComponentStatus::ready(), Ok(()))
}
