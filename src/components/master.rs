//! Master servers

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;

use super::server::reconcile_workload;
use super::{dry_status, Component, ComponentStatus, Microservice, MicroserviceSpec, SyncContext};
use crate::crd::YtsaurusSpec;
use crate::labeller::Labeller;
use crate::resources::ObjectStore;
use crate::ytconfig::{self, Generator};
use crate::Error;

/// Name of the master component
pub const MASTER_COMPONENT_NAME: &str = "Master";

/// The master replica group; has no upstream
#[derive(Debug)]
pub struct Master {
    server: Microservice<StatefulSet>,
}

impl Master {
    /// Wire the master component of a cluster
    pub fn new(
        cluster_name: &str,
        namespace: &str,
        spec: &YtsaurusSpec,
        cfgen: &Arc<Generator>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let labeller = Labeller::new(cluster_name, namespace, "yt-master", MASTER_COMPONENT_NAME);
        let server = Microservice::new(
            &labeller,
            store,
            MicroserviceSpec {
                workload_name: ytconfig::master_workload_name().to_string(),
                service_name: ytconfig::master_service_name().to_string(),
                image: spec.image_for(&spec.masters),
                instance_count: spec.masters.instance_count,
                config_file_name: "ytserver-master.yson".to_string(),
                port: 9010,
                binary: Some("ytserver-master".to_string()),
                anti_affinity: spec.masters.enable_anti_affinity.unwrap_or(false),
                config_overrides: spec.config_overrides.clone(),
            },
            cfgen.bind(Generator::master_config),
            ytconfig::restart_on_change(ytconfig::MASTER_RESTART_FIELDS),
        );
        Self { server }
    }
}

#[async_trait]
impl Component for Master {
    fn name(&self) -> &str {
        MASTER_COMPONENT_NAME
    }

    async fn fetch(&mut self) -> Result<(), Error> {
        self.server.fetch().await
    }

    async fn status(&self, ctx: &SyncContext) -> Result<ComponentStatus, Error> {
        let outcome = reconcile_workload(self.name(), &self.server, &[], &[], ctx, true).await;
        dry_status(self.name(), outcome)
    }

    async fn sync(&self, ctx: &SyncContext) -> Result<(), Error> {
        reconcile_workload(self.name(), &self.server, &[], &[], ctx, false)
            .await
            .1
    }
}
