//! YTsaurus Operator - reconciles YTsaurus clusters and SPYT releases

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ytsaurus_operator::controller::{
    error_policy, error_policy_spyt, reconcile, reconcile_spyt, Context,
};
use ytsaurus_operator::crd::{Spyt, Ytsaurus};
use ytsaurus_operator::FIELD_MANAGER;

/// YTsaurus operator - brings YTsaurus clusters to their declared state
#[derive(Parser, Debug)]
#[command(name = "ytsaurus-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches Ytsaurus and Spyt resources and reconciles them until the
    /// process receives a termination signal.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Only watch resources in this namespace (all namespaces when unset)
    #[arg(long, env = "YTOP_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds between reconciles of a healthy resource
    #[arg(long, env = "YTOP_REQUEUE_SECS", default_value_t = 10)]
    requeue_secs: u64,

    /// Seconds before retrying a failed reconcile
    #[arg(long, env = "YTOP_ERROR_REQUEUE_SECS", default_value_t = 30)]
    error_requeue_secs: u64,

    /// Skip installing CRDs on startup
    #[arg(long, env = "YTOP_SKIP_CRD_INSTALL")]
    skip_crd_install: bool,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_secs: 10,
            error_requeue_secs: 30,
            skip_crd_install: false,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        for crd in [Ytsaurus::crd(), Spyt::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

/// Ensure the operator's CRDs are installed
///
/// Uses server-side apply so the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in [Ytsaurus::crd(), Spyt::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

/// Run the Ytsaurus and Spyt controllers until shutdown
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crds_installed(&client).await?;
    }

    let ctx = Arc::new(Context::new(client.clone()).with_intervals(
        Duration::from_secs(args.requeue_secs),
        Duration::from_secs(args.error_requeue_secs),
    ));

    let (clusters, releases): (Api<Ytsaurus>, Api<Spyt>) = match &args.namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    tracing::info!(namespace = ?args.namespace, "Starting YTsaurus controllers...");
    tracing::info!("  - Ytsaurus controller");
    tracing::info!("  - Spyt controller");

    let cluster_controller = Controller::new(clusters, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Ytsaurus reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Ytsaurus reconciliation error");
                }
            }
        });

    let spyt_controller = Controller::new(releases, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile_spyt, error_policy_spyt, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Spyt reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Spyt reconciliation error");
                }
            }
        });

    // Run both controllers concurrently
    tokio::select! {
        _ = cluster_controller => {
            tracing::info!("Ytsaurus controller completed");
        }
        _ = spyt_controller => {
            tracing::info!("Spyt controller completed");
        }
    }

    tracing::info!("YTsaurus operator shutting down");
    Ok(())
}
