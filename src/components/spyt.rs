//! SPYT release publishing
//!
//! A small pipeline run strictly in order, one step per tick at most:
//!
//! 1. wait for the target cluster to be `Running`
//! 2. create a secret with a fresh robot token
//! 3. init job creating the `spyt_releaser` user for that token
//! 4. init job publishing the release with the token in its environment
//!
//! Each step is a check-then-act against already-fetched state, so any tick
//! may resume where the previous one stopped.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::EnvVar;
use kube::ResourceExt;
use tracing::info;

use super::init_job::{create_user_command, native_driver_prologue, InitJob};
use super::{dry_status, Component, ComponentStatus, Outcome, SyncContext, SyncStatus};
use crate::crd::{self, Ytsaurus};
use crate::labeller::Labeller;
use crate::resources::{ObjectStore, StringSecret};
use crate::ytconfig::{rand_string, Generator};
use crate::{Error, DEFAULT_HTTP_PROXY_ROLE, TOKEN_LENGTH, TOKEN_SECRET_KEY};

/// Robot user the release is published as
pub const SPYT_USER: &str = "spyt_releaser";

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Publishes one SPYT release into a cluster
#[derive(Debug)]
pub struct Spyt {
    name: String,
    ytsaurus_name: String,
    proxy_address: String,
    secret: StringSecret,
    init_user: InitJob,
    init_environment: InitJob,
}

impl Spyt {
    /// Wire the pipeline of a Spyt resource publishing into `ytsaurus`
    pub fn new(
        spyt: &crd::Spyt,
        ytsaurus: &Ytsaurus,
        cfgen: &Arc<Generator>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let release = &spyt.spec.name;
        let labeller = Labeller::new(
            spyt.name_any(),
            spyt.namespace().unwrap_or_default(),
            format!("ytsaurus-spyt-{release}"),
            format!("SPYT-{release}"),
        );
        let client_config = cfgen.bind(Generator::native_client_config);

        Self {
            init_user: InitJob::new(
                &labeller,
                store.clone(),
                "user",
                &ytsaurus.spec.core_image,
                &ytsaurus.spec.image_pull_secrets,
                client_config.clone(),
            ),
            init_environment: InitJob::new(
                &labeller,
                store.clone(),
                "spyt-environment",
                &spyt.spec.image,
                &ytsaurus.spec.image_pull_secrets,
                client_config,
            ),
            secret: StringSecret::new(&labeller.secret_name(), &labeller, store),
            proxy_address: cfgen.http_proxies_address(DEFAULT_HTTP_PROXY_ROLE),
            ytsaurus_name: ytsaurus.name_any(),
            name: labeller.component_name,
        }
    }

    fn token(&self) -> String {
        self.secret.get_value(TOKEN_SECRET_KEY).unwrap_or_default()
    }

    fn init_user_script(&self) -> String {
        let mut script = vec![native_driver_prologue()];
        script.extend(create_user_command(SPYT_USER, &self.token(), true));
        script.join("\n")
    }

    fn init_environment_script(&self) -> String {
        "/entrypoint.sh".to_string()
    }

    async fn reconcile(&self, ctx: &SyncContext, dry: bool) -> Outcome {
        if !ctx.cluster.is_running() {
            return (
                ComponentStatus::waiting(SyncStatus::Blocked, &self.ytsaurus_name),
                Ok(()),
            );
        }

        if self.secret.need_sync(TOKEN_SECRET_KEY, "") {
            let result = if dry {
                Ok(())
            } else {
                let mut secret = self.secret.build();
                secret
                    .string_data
                    .get_or_insert_with(Default::default)
                    .insert(TOKEN_SECRET_KEY.to_string(), rand_string(TOKEN_LENGTH));
                info!(component = %self.name, secret = self.secret.name(), "generating robot token");
                self.secret.sync(&secret).await
            };
            return (
                ComponentStatus::waiting(SyncStatus::Pending, self.secret.name()),
                result,
            );
        }

        let (status, result) = self
            .init_user
            .sync(dry, &self.init_user_script(), Vec::new())
            .await;
        if !status.is_ready() {
            return (status, result);
        }

        let environment = vec![
            env("YT_PROXY", self.proxy_address.clone()),
            env("YT_TOKEN", self.token()),
            env("EXTRA_PUBLISH_CLUSTER_OPTIONS", "--ignore-existing"),
        ];
        self.init_environment
            .sync(dry, &self.init_environment_script(), environment)
            .await
    }
}

#[async_trait]
impl Component for Spyt {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self) -> Result<(), Error> {
        self.secret.fetch().await?;
        self.init_user.fetch().await?;
        self.init_environment.fetch().await
    }

    async fn status(&self, ctx: &SyncContext) -> Result<ComponentStatus, Error> {
        let outcome = self.reconcile(ctx, true).await;
        dry_status(&self.name, outcome)
    }

    async fn sync(&self, ctx: &SyncContext) -> Result<(), Error> {
        self.reconcile(ctx, false).await.1
    }
}
