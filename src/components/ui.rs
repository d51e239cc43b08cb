//! Web UI

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;

use super::master::MASTER_COMPONENT_NAME;
use super::server::reconcile_workload;
use super::{dry_status, Component, ComponentStatus, Microservice, MicroserviceSpec, SyncContext};
use crate::crd::UiSpec;
use crate::labeller::Labeller;
use crate::resources::ObjectStore;
use crate::ytconfig::{self, Generator};
use crate::Error;

/// Name of the UI component
pub const UI_COMPONENT_NAME: &str = "UI";

/// Stateless web UI served from a Deployment
#[derive(Debug)]
pub struct Ui {
    server: Microservice<Deployment>,
    dependencies: Vec<String>,
}

impl Ui {
    /// Wire the UI component of a cluster
    pub fn new(
        cluster_name: &str,
        namespace: &str,
        spec: &UiSpec,
        cfgen: &Arc<Generator>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let labeller = Labeller::new(cluster_name, namespace, "yt-ui", UI_COMPONENT_NAME);
        let server = Microservice::new(
            &labeller,
            store,
            MicroserviceSpec {
                workload_name: "ytsaurus-ui-deployment".to_string(),
                service_name: "ytsaurus-ui".to_string(),
                image: spec.image.clone(),
                instance_count: spec.instance_count,
                config_file_name: "clusters-config.json".to_string(),
                port: 80,
                ..Default::default()
            },
            cfgen.bind(Generator::ui_config),
            ytconfig::hot_reload(),
        );
        Self {
            server,
            dependencies: vec![MASTER_COMPONENT_NAME.to_string()],
        }
    }
}

#[async_trait]
impl Component for Ui {
    fn name(&self) -> &str {
        UI_COMPONENT_NAME
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    async fn fetch(&mut self) -> Result<(), Error> {
        self.server.fetch().await
    }

    async fn status(&self, ctx: &SyncContext) -> Result<ComponentStatus, Error> {
        let outcome =
            reconcile_workload(self.name(), &self.server, &self.dependencies, &[], ctx, true).await;
        dry_status(self.name(), outcome)
    }

    async fn sync(&self, ctx: &SyncContext) -> Result<(), Error> {
        reconcile_workload(self.name(), &self.server, &self.dependencies, &[], ctx, false)
            .await
            .1
    }
}
