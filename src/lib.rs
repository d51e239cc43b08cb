//! YTsaurus operator - component reconciliation core
//!
//! Drives a YTsaurus cluster (masters, exec nodes, auxiliary services) toward
//! the state declared in its `Ytsaurus` resource.
//!
//! # Architecture
//!
//! Every cluster part is a [`components::Component`] with a uniform
//! `fetch -> status -> sync` lifecycle. `status` and `sync` run the same
//! decision function, once dry and once wet, so a component never reports
//! `Ready` while it still has work to do. The outer loop in [`controller`]
//! evaluates components in dependency order and moves the cluster through
//! its `Running` / `Updating` phases.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Ytsaurus, Spyt)
//! - [`components`] - Component contract, status vocabulary and concrete components
//! - [`resources`] - Orchestration-layer access (object store, typed handles, secrets)
//! - [`labeller`] - Object naming and labels
//! - [`ytconfig`] - Opaque config generation
//! - [`controller`] - Reconcile entry points and the per-tick component manager
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod components;
pub mod controller;
pub mod crd;
pub mod error;
pub mod labeller;
pub mod resources;
pub mod ytconfig;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every server-side apply issued by the operator
pub const FIELD_MANAGER: &str = "ytsaurus-operator";

/// Secret key holding the token of an auxiliary service's robot user
pub const TOKEN_SECRET_KEY: &str = "YT_TOKEN";

/// Length of generated robot-user tokens
pub const TOKEN_LENGTH: usize = 30;

/// File name of the native client config mounted into init jobs
pub const CLIENT_CONFIG_FILE_NAME: &str = "client.yson";

/// Default HTTP proxy role
pub const DEFAULT_HTTP_PROXY_ROLE: &str = "default";
