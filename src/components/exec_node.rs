//! Exec node pools
//!
//! One component per pool in `spec.execNodes`. A pool waits for the masters,
//! and may append user-defined sidecar containers to its pods.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use tracing::debug;

use super::master::MASTER_COMPONENT_NAME;
use super::server::reconcile_workload;
use super::{dry_status, Component, ComponentStatus, Microservice, MicroserviceSpec, SyncContext};
use crate::crd::{ExecNodesSpec, YtsaurusSpec};
use crate::labeller::{format_with_default, Labeller};
use crate::resources::ObjectStore;
use crate::ytconfig::{self, Generator};
use crate::Error;

/// One pool of exec nodes
#[derive(Debug)]
pub struct ExecNode {
    name: String,
    server: Microservice<StatefulSet>,
    dependencies: Vec<String>,
    sidecars: Vec<String>,
}

impl ExecNode {
    /// Wire the component for one exec node pool
    pub fn new(
        cluster_name: &str,
        namespace: &str,
        spec: &YtsaurusSpec,
        pool: &ExecNodesSpec,
        cfgen: &Arc<Generator>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let labeller = Labeller::new(
            cluster_name,
            namespace,
            format_with_default("yt-exec-node", &pool.name),
            format_with_default("ExecNode", &pool.name),
        );

        let config_pool = pool.clone();
        let server = Microservice::new(
            &labeller,
            store,
            MicroserviceSpec {
                workload_name: ytconfig::exec_nodes_workload_name(&pool.name),
                service_name: ytconfig::exec_nodes_service_name(&pool.name),
                image: spec.image_for(&pool.instance),
                instance_count: pool.instance.instance_count,
                config_file_name: "ytserver-exec-node.yson".to_string(),
                port: 9012,
                binary: Some("ytserver-node".to_string()),
                anti_affinity: pool.instance.enable_anti_affinity.unwrap_or(false),
                config_overrides: spec.config_overrides.clone(),
            },
            cfgen.bind(move |g| g.exec_node_config(&config_pool)),
            ytconfig::restart_on_change(ytconfig::EXEC_NODE_RESTART_FIELDS),
        );

        Self {
            name: labeller.component_name,
            server,
            dependencies: vec![MASTER_COMPONENT_NAME.to_string()],
            sidecars: pool.sidecars.clone(),
        }
    }
}

#[async_trait]
impl Component for ExecNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    async fn fetch(&mut self) -> Result<(), Error> {
        self.server.fetch().await
    }

    async fn status(&self, ctx: &SyncContext) -> Result<ComponentStatus, Error> {
        let outcome = reconcile_workload(
            &self.name,
            &self.server,
            &self.dependencies,
            &self.sidecars,
            ctx,
            true,
        )
        .await;
        dry_status(&self.name, outcome)
    }

    async fn sync(&self, ctx: &SyncContext) -> Result<(), Error> {
        let (status, result) = reconcile_workload(
            &self.name,
            &self.server,
            &self.dependencies,
            &self.sidecars,
            ctx,
            false,
        )
        .await;
        debug!(component = %self.name, %status, "exec node synced");
        result
    }
}
