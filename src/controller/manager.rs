//! Per-tick driver over a set of components

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::components::{
    ClusterSnapshot, Component, ComponentStatus, ExecNode, Master, SyncContext, SyncStatus, Ui,
};
use crate::crd::YtsaurusSpec;
use crate::resources::ObjectStore;
use crate::ytconfig::Generator;
use crate::Error;

/// Fresh components of one resource, ordered so dependencies come first
pub struct ComponentManager {
    components: Vec<Box<dyn Component>>,
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.names())
            .finish()
    }
}

impl ComponentManager {
    /// Order the given components by their declared dependencies.
    ///
    /// Components without a dependency relation keep their relative order.
    /// Unknown dependencies and cycles are rejected.
    pub fn new(components: Vec<Box<dyn Component>>) -> Result<Self, Error> {
        let order = topological_order(&components)?;
        let mut slots: Vec<Option<Box<dyn Component>>> = components.into_iter().map(Some).collect();
        let components = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(Self { components })
    }

    /// Wire every component of a Ytsaurus cluster
    pub fn for_cluster(
        cluster_name: &str,
        namespace: &str,
        spec: &YtsaurusSpec,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, Error> {
        let cfgen = Arc::new(Generator::new(cluster_name, namespace, spec.clone()));

        let mut components: Vec<Box<dyn Component>> = vec![Box::new(Master::new(
            cluster_name,
            namespace,
            spec,
            &cfgen,
            store.clone(),
        ))];
        for pool in &spec.exec_nodes {
            components.push(Box::new(ExecNode::new(
                cluster_name,
                namespace,
                spec,
                pool,
                &cfgen,
                store.clone(),
            )));
        }
        if let Some(ui) = &spec.ui {
            components.push(Box::new(Ui::new(cluster_name, namespace, ui, &cfgen, store)));
        }

        Self::new(components)
    }

    /// Component names in evaluation order
    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Fetch every component concurrently
    pub async fn fetch(&mut self) -> Result<(), Error> {
        try_join_all(self.components.iter_mut().map(|c| c.fetch())).await?;
        Ok(())
    }

    /// Dry pass over every component in dependency order.
    ///
    /// Each component sees the statuses computed before it in the same tick.
    pub async fn status(&self, cluster: ClusterSnapshot) -> Result<SyncContext, Error> {
        let mut ctx = SyncContext::new(cluster);
        for c in &self.components {
            let status = c.status(&ctx).await?;
            debug!(component = c.name(), %status, "component status");
            ctx.board.record(c.name(), status);
        }
        Ok(ctx)
    }

    /// Wet pass over components that are not ready and whose dependencies are.
    ///
    /// `NeedLocalUpdate` components are left alone: acting on them takes a
    /// cluster-level state change first. Pods removal runs regardless of
    /// upstream readiness. Stops at the first error.
    pub async fn sync(&self, ctx: &SyncContext) -> Result<Vec<String>, Error> {
        let mut synced = Vec::new();
        for c in &self.components {
            let Some(status) = ctx.board.get(c.name()) else {
                continue;
            };
            if status.is_ready() || status.sync_status == SyncStatus::NeedLocalUpdate {
                continue;
            }
            let removing = status.sync_status == SyncStatus::Updating;
            if let Some(upstream) = ctx.board.blocker(c.dependencies()).filter(|_| !removing) {
                debug!(component = c.name(), upstream, "skipping sync until upstream is ready");
                continue;
            }

            info!(component = c.name(), %status, "syncing component");
            if let Err(e) = c.sync(ctx).await {
                warn!(component = c.name(), error = %e, "component sync failed");
                return Err(e);
            }
            synced.push(c.name().to_string());
        }
        Ok(synced)
    }

    /// Whether every component is ready
    pub fn all_ready(&self, ctx: &SyncContext) -> bool {
        self.components
            .iter()
            .all(|c| ctx.board.get(c.name()).is_some_and(ComponentStatus::is_ready))
    }

    /// Names of components whose status is `status`
    pub fn with_status(&self, ctx: &SyncContext, status: SyncStatus) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| ctx.board.get(c.name()).is_some_and(|s| s.sync_status == status))
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Human-readable summary of components that are not ready
    pub fn summary(&self, ctx: &SyncContext) -> Option<String> {
        let pending: Vec<String> = self
            .components
            .iter()
            .filter_map(|c| {
                let status = ctx.board.get(c.name())?;
                (!status.is_ready()).then(|| format!("{}: {status}", c.name()))
            })
            .collect();
        (!pending.is_empty()).then(|| pending.join(", "))
    }
}

/// Kahn's algorithm over declared dependencies, stable for independent components
fn topological_order(components: &[Box<dyn Component>]) -> Result<Vec<usize>, Error> {
    let index: HashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name(), i))
        .collect();
    if index.len() != components.len() {
        return Err(Error::validation("duplicate component names"));
    }

    let mut indegree = vec![0usize; components.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
    for (i, c) in components.iter().enumerate() {
        for dep in c.dependencies() {
            let Some(&j) = index.get(dep.as_str()) else {
                return Err(Error::validation(format!(
                    "component {} depends on unknown component {dep}",
                    c.name()
                )));
            };
            indegree[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..components.len())
        .filter(|&i| indegree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(components.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                queue.push_back(d);
            }
        }
    }
    if order.len() != components.len() {
        return Err(Error::validation("component dependencies form a cycle"));
    }
    Ok(order)
}
