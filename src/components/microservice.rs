//! Managed workload: config map + replica group + service
//!
//! The three objects are reduced to one `need_sync` decision and one apply
//! step. Config is applied first so restarted processes read fresh config.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Service, ServicePort, ServiceSpec};
use tracing::debug;

use super::ConfigHelper;
use crate::labeller::Labeller;
use crate::resources::{Managed, ObjectStore, ReplicaGroup, WorkloadTemplate, CONFIG_MOUNT_PATH};
use crate::ytconfig::{ConfigGenerator, ReloadChecker};
use crate::Error;

/// Construction parameters of a [`Microservice`]
#[derive(Clone, Debug, Default)]
pub struct MicroserviceSpec {
    /// Name of the replica group object
    pub workload_name: String,
    /// Name of the service object
    pub service_name: String,
    /// Image of the main container
    pub image: String,
    /// Desired replica count
    pub instance_count: i32,
    /// Name of the generated file inside the config map
    pub config_file_name: String,
    /// Port exposed by the service
    pub port: i32,
    /// Server binary started with the mounted config; the image entrypoint
    /// runs when unset
    pub binary: Option<String>,
    /// Forbid two replicas on one node
    pub anti_affinity: bool,
    /// User config map with overrides for the generated file
    pub config_overrides: Option<String>,
}

/// One config map, one replica group and one service
pub struct Microservice<W> {
    labeller: Labeller,
    spec: MicroserviceSpec,
    config: ConfigHelper,
    workload: Managed<W>,
    service: Managed<Service>,
}

impl<W> std::fmt::Debug for Microservice<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Microservice")
            .field("workload", &self.workload)
            .field("service", &self.service)
            .field("config", &self.config)
            .finish()
    }
}

impl<W: ReplicaGroup> Microservice<W> {
    /// Create the handles; nothing is read until [`Microservice::fetch`]
    pub fn new(
        labeller: &Labeller,
        store: Arc<dyn ObjectStore>,
        spec: MicroserviceSpec,
        generator: ConfigGenerator,
        reload_checker: ReloadChecker,
    ) -> Self {
        let ns = &labeller.namespace;
        let mut config = ConfigHelper::new(
            labeller,
            store.clone(),
            &labeller.main_config_map_name(),
            &spec.config_file_name,
            generator,
        )
        .with_reload_checker(reload_checker);
        if let Some(overrides) = &spec.config_overrides {
            config = config.with_overrides(store.clone(), overrides);
        }
        Self {
            config,
            workload: Managed::new(store.clone(), ns, &spec.workload_name),
            service: Managed::new(store, ns, &spec.service_name),
            labeller: labeller.clone(),
            spec,
        }
    }

    /// Load the three owned objects
    pub async fn fetch(&mut self) -> Result<(), Error> {
        self.config.fetch().await?;
        self.workload.fetch().await?;
        self.service.fetch().await
    }

    /// Whether any owned object differs from desired, `sidecars` included
    pub fn need_sync(&self, sidecars: &[Container]) -> bool {
        let workload_drift = match self.workload.observed() {
            None => true,
            Some(w) => {
                w.differs_from(self.spec.instance_count, &self.spec.image)
                    || w.sidecars_differ(sidecars)
            }
        };
        self.config.need_sync() || !self.service.exists() || workload_drift
    }

    /// Whether the running replica group needs its pods recreated: the
    /// image changed, or the config changed in a way servers cannot reload.
    ///
    /// Replica count and sidecar drift are not local updates; neither is an
    /// absent replica group.
    pub fn need_local_update(&self) -> bool {
        self.workload
            .observed()
            .is_some_and(|w| w.image_differs(&self.spec.image) || self.config.need_restart())
    }

    /// Fails when the user override for this component's config is malformed
    pub fn check_config_overrides(&self) -> Result<(), Error> {
        self.config.check_overrides()
    }

    /// Desired replica group with `sidecars` after the main container
    pub fn build_workload(&self, sidecars: &[Container]) -> Result<W, Error> {
        let command = self
            .spec
            .binary
            .iter()
            .flat_map(|binary| {
                [
                    binary.clone(),
                    "--config".to_string(),
                    format!("{CONFIG_MOUNT_PATH}/{}", self.spec.config_file_name),
                ]
            })
            .collect();
        W::skeleton(
            &self.labeller,
            &WorkloadTemplate {
                name: self.spec.workload_name.clone(),
                service_name: self.spec.service_name.clone(),
                replicas: self.spec.instance_count,
                image: self.spec.image.clone(),
                config_map: Some(self.labeller.main_config_map_name()),
                command,
                anti_affinity: self.spec.anti_affinity,
                sidecars: sidecars.to_vec(),
            },
        )
    }

    /// Desired service
    pub fn build_service(&self) -> Service {
        Service {
            metadata: self.labeller.object_meta(&self.spec.service_name),
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                selector: Some(self.labeller.selector_labels()),
                ports: Some(vec![ServicePort {
                    name: Some("rpc".to_string()),
                    port: self.spec.port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Apply config, the replica group, then the service.
    ///
    /// Stops at the first failure; every apply is idempotent so the next tick
    /// picks up the rest.
    pub async fn sync(&self, sidecars: &[Container]) -> Result<(), Error> {
        let workload = self.build_workload(sidecars)?;
        self.config.sync().await?;
        self.workload.apply(&workload).await?;
        self.service.apply(&self.build_service()).await
    }

    /// Delete the replica group, leaving config and service in place
    pub async fn remove_pods(&self) -> Result<(), Error> {
        if !self.workload.exists() {
            debug!(object = %self.workload.key(), "replica group already removed");
            return Ok(());
        }
        self.workload.delete().await
    }

    /// Ready replicas equal desired replicas
    pub fn are_pods_ready(&self) -> bool {
        self.workload
            .observed()
            .is_some_and(|w| w.are_pods_ready())
    }
}
