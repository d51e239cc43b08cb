//! One-shot initialization jobs
//!
//! An init job is a config map holding a script plus the native client
//! config, and a `Job` that runs the script once. Jobs are never re-run: once
//! the job object exists, only its completion is tracked.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, LocalObjectReference, PodSpec,
    PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{ComponentStatus, Outcome, SyncStatus};
use crate::labeller::Labeller;
use crate::resources::{Managed, ObjectStore, CONFIG_MOUNT_PATH};
use crate::ytconfig::ConfigGenerator;
use crate::{Error, CLIENT_CONFIG_FILE_NAME};

const SCRIPT_FILE_NAME: &str = "init-cluster.sh";
const CONTAINER_NAME: &str = "ytsaurus-init";

/// Shell prologue exporting the native driver config for the `yt` CLI
pub fn native_driver_prologue() -> String {
    [
        "set -e",
        "set -x",
        &format!("export YT_DRIVER_CONFIG_PATH={CONFIG_MOUNT_PATH}/{CLIENT_CONFIG_FILE_NAME}"),
    ]
    .join("\n")
}

/// Commands creating a user, registering its token and optionally making it a superuser.
///
/// Only the SHA-256 of the token is stored in the cluster.
pub fn create_user_command(user: &str, token: &str, superuser: bool) -> Vec<String> {
    let mut commands = vec![format!(
        "/usr/bin/yt create user --attributes '{{name=\"{user}\"}}' --ignore-existing"
    )];
    if !token.is_empty() {
        let hash = hex::encode(Sha256::digest(token.as_bytes()));
        commands.push(format!(
            "/usr/bin/yt create map_node '//sys/cypress_tokens/{hash}' --attributes '{{user=\"{user}\"}}' --ignore-existing"
        ));
    }
    if superuser {
        commands.push(format!("/usr/bin/yt add-member {user} superusers || true"));
    }
    commands
}

/// A named one-shot job of a component
pub struct InitJob {
    labeller: Labeller,
    name: String,
    image: String,
    image_pull_secrets: Vec<String>,
    client_config: ConfigGenerator,
    config_map: Managed<ConfigMap>,
    job: Managed<Job>,
}

impl std::fmt::Debug for InitJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitJob")
            .field("job", &self.job)
            .field("config_map", &self.config_map)
            .finish()
    }
}

impl InitJob {
    /// Create handles for the job named `name` of the labelled component
    pub fn new(
        labeller: &Labeller,
        store: Arc<dyn ObjectStore>,
        name: &str,
        image: &str,
        image_pull_secrets: &[String],
        client_config: ConfigGenerator,
    ) -> Self {
        let ns = &labeller.namespace;
        Self {
            config_map: Managed::new(store.clone(), ns, &labeller.init_job_config_map_name(name)),
            job: Managed::new(store, ns, &labeller.init_job_name(name)),
            labeller: labeller.clone(),
            name: name.to_string(),
            image: image.to_string(),
            image_pull_secrets: image_pull_secrets.to_vec(),
            client_config,
        }
    }

    /// Name of the job object
    pub fn job_name(&self) -> &str {
        self.job.name()
    }

    /// Load the job and its config map
    pub async fn fetch(&mut self) -> Result<(), Error> {
        self.config_map.fetch().await?;
        self.job.fetch().await
    }

    fn condition(&self, type_: &str) -> bool {
        self.job
            .observed()
            .and_then(|j| j.status.as_ref())
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conds| conds.iter().any(|c| c.type_ == type_ && c.status == "True"))
    }

    /// Whether the job finished successfully
    pub fn is_completed(&self) -> bool {
        let succeeded = self
            .job
            .observed()
            .and_then(|j| j.status.as_ref())
            .and_then(|s| s.succeeded)
            .unwrap_or(0);
        succeeded > 0 || self.condition("Complete")
    }

    /// Whether the job gave up
    pub fn is_failed(&self) -> bool {
        self.condition("Failed")
    }

    /// Desired config map with the script and the client config
    pub fn build_config_map(&self, script: &str) -> Result<ConfigMap, Error> {
        let client = String::from_utf8((self.client_config)()?)
            .map_err(|e| Error::config(format!("{}: {e}", self.config_map.key())))?;
        Ok(ConfigMap {
            metadata: self.labeller.object_meta(self.config_map.name()),
            data: Some(BTreeMap::from([
                (SCRIPT_FILE_NAME.to_string(), script.to_string()),
                (CLIENT_CONFIG_FILE_NAME.to_string(), client),
            ])),
            ..Default::default()
        })
    }

    /// Desired job running the script with the given environment
    pub fn build(&self, env: Vec<EnvVar>) -> Job {
        let volume = "config";
        let pull_secrets = (!self.image_pull_secrets.is_empty()).then(|| {
            self.image_pull_secrets
                .iter()
                .map(|name| LocalObjectReference { name: name.clone() })
                .collect()
        });

        Job {
            metadata: self.labeller.object_meta(self.job.name()),
            spec: Some(JobSpec {
                backoff_limit: Some(6),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labeller.labels()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("OnFailure".to_string()),
                        image_pull_secrets: pull_secrets,
                        containers: vec![Container {
                            name: CONTAINER_NAME.to_string(),
                            image: Some(self.image.clone()),
                            command: Some(vec![
                                "bash".to_string(),
                                "-x".to_string(),
                                format!("{CONFIG_MOUNT_PATH}/{SCRIPT_FILE_NAME}"),
                            ]),
                            env: (!env.is_empty()).then_some(env),
                            volume_mounts: Some(vec![VolumeMount {
                                name: volume.to_string(),
                                mount_path: CONFIG_MOUNT_PATH.to_string(),
                                read_only: Some(true),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: volume.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: self.config_map.name().to_string(),
                                default_mode: Some(0o500),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Run the job once and track its completion.
    ///
    /// - absent: create config map and job, `Pending`
    /// - failed: `Blocked("job failed")`
    /// - running: `Blocked(<job name>)`
    /// - complete: `Ready`
    pub async fn sync(&self, dry: bool, script: &str, env: Vec<EnvVar>) -> Outcome {
        if !self.job.exists() {
            let result = if dry {
                Ok(())
            } else {
                self.create(script, env).await
            };
            return (ComponentStatus::waiting(SyncStatus::Pending, self.job_name()), result);
        }

        if self.is_failed() {
            return (ComponentStatus::waiting(SyncStatus::Blocked, "job failed"), Ok(()));
        }

        if !self.is_completed() {
            return (
                ComponentStatus::waiting(SyncStatus::Blocked, self.job_name()),
                Ok(()),
            );
        }

        (ComponentStatus::ready(), Ok(()))
    }

    async fn create(&self, script: &str, env: Vec<EnvVar>) -> Result<(), Error> {
        info!(job = self.job_name(), init_job = %self.name, "starting init job");
        self.config_map.apply(&self.build_config_map(script)?).await?;
        self.job.apply(&self.build(env)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryStore;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

    fn labeller() -> Labeller {
        Labeller::new("prod", "yt", "ytsaurus-spyt-main", "SPYT-main")
    }

    async fn fetched(store: &Arc<MemoryStore>) -> InitJob {
        let client: ConfigGenerator = Arc::new(|| Ok(b"{driver={}}".to_vec()));
        let mut job = InitJob::new(&labeller(), store.clone(), "user", "yt:1", &[], client);
        job.fetch().await.unwrap();
        job
    }

    #[test]
    fn user_commands_store_token_hash_only() {
        let commands = create_user_command("spyt_releaser", "secret-token", true);
        assert_eq!(commands.len(), 3);
        assert!(commands[0].contains("name=\"spyt_releaser\""));
        assert!(!commands[1].contains("secret-token"));
        let hash = hex::encode(Sha256::digest(b"secret-token"));
        assert!(commands[1].contains(&format!("//sys/cypress_tokens/{hash}")));
        assert!(commands[2].contains("superusers"));

        assert_eq!(create_user_command("robot", "", false).len(), 1);
    }

    #[test]
    fn prologue_points_driver_at_mounted_client_config() {
        assert!(native_driver_prologue().contains("YT_DRIVER_CONFIG_PATH=/config/client.yson"));
    }

    #[tokio::test]
    async fn absent_job_is_created_once() {
        let store = Arc::new(MemoryStore::new());
        let job = fetched(&store).await;

        let (status, result) = job.sync(true, "echo hi", vec![]).await;
        assert_eq!(status.sync_status, SyncStatus::Pending);
        assert!(result.is_ok());
        assert_eq!(store.mutation_count(), 0);

        let (status, result) = job.sync(false, "echo hi", vec![]).await;
        assert_eq!(status.sync_status, SyncStatus::Pending);
        result.unwrap();
        assert!(store.contains::<Job>("yt", "ytsaurus-spyt-main-init-job-user"));
        let cm: ConfigMap = store
            .object("yt", "ytsaurus-spyt-main-init-job-user-config")
            .unwrap();
        let data = cm.data.unwrap();
        assert_eq!(data[SCRIPT_FILE_NAME], "echo hi");
        assert_eq!(data[CLIENT_CONFIG_FILE_NAME], "{driver={}}");
    }

    #[tokio::test]
    async fn running_then_complete() {
        let store = Arc::new(MemoryStore::new());
        fetched(&store).await.sync(false, "true", vec![]).await.1.unwrap();
        store.clear_mutations();

        let job = fetched(&store).await;
        let (status, _) = job.sync(false, "true", vec![]).await;
        assert_eq!(
            status,
            ComponentStatus::waiting(SyncStatus::Blocked, "ytsaurus-spyt-main-init-job-user")
        );

        store.edit::<Job>("yt", "ytsaurus-spyt-main-init-job-user", |j| {
            j.status = Some(JobStatus {
                succeeded: Some(1),
                ..Default::default()
            });
        });
        let job = fetched(&store).await;
        let (status, _) = job.sync(false, "true", vec![]).await;
        assert!(status.is_ready());
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn failed_job_blocks() {
        let store = Arc::new(MemoryStore::new());
        fetched(&store).await.sync(false, "false", vec![]).await.1.unwrap();
        store.edit::<Job>("yt", "ytsaurus-spyt-main-init-job-user", |j| {
            j.status = Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: "Failed".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            });
        });

        let (status, _) = fetched(&store).await.sync(true, "false", vec![]).await;
        assert_eq!(status, ComponentStatus::waiting(SyncStatus::Blocked, "job failed"));
    }

    #[test]
    fn job_carries_env_and_pull_secrets() {
        let client: ConfigGenerator = Arc::new(|| Ok(Vec::new()));
        let job = InitJob::new(
            &labeller(),
            Arc::new(MemoryStore::new()),
            "spyt-environment",
            "spyt:1.76",
            &["regcred".to_string()],
            client,
        );
        let built = job.build(vec![EnvVar {
            name: "YT_PROXY".to_string(),
            value: Some("http-proxies".to_string()),
            ..Default::default()
        }]);
        let pod = built.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.image_pull_secrets.unwrap()[0].name, "regcred");
        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("spyt:1.76"));
        assert_eq!(container.env.as_ref().unwrap()[0].name, "YT_PROXY");
    }
}
