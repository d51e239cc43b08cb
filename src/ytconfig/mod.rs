//! Config generation
//!
//! Produces the opaque config documents mounted into each server process.
//! The reconciliation core never looks inside them: it only compares the
//! rendered bytes with what is stored in the component's config map. The
//! two exceptions are user overrides, deep-merged into the rendered
//! document, and reload checkers, which look at a few fields to decide
//! whether a change can be picked up without a restart.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

use crate::crd::{ExecNodesSpec, YtsaurusSpec};
use crate::labeller::format_with_default;
use crate::{Error, DEFAULT_HTTP_PROXY_ROLE};

/// Lazily invoked config renderer
pub type ConfigGenerator = Arc<dyn Fn() -> Result<Vec<u8>, Error> + Send + Sync>;

/// Decides whether going from the stored config (first argument) to the
/// desired one (second) needs the server processes restarted.
///
/// `Ok(false)` means the servers re-read the file on their own.
pub type ReloadChecker = Arc<dyn Fn(&[u8], &[u8]) -> Result<bool, Error> + Send + Sync>;

/// Checker for servers that pick up any config change without a restart
pub fn hot_reload() -> ReloadChecker {
    Arc::new(|_, _| Ok(false))
}

/// Checker requiring a restart when a value under any of the JSON pointers changes
pub fn restart_on_change(pointers: &'static [&'static str]) -> ReloadChecker {
    Arc::new(move |observed, desired| {
        let observed: Value = serde_json::from_slice(observed)
            .map_err(|e| Error::config(format!("stored config is not JSON: {e}")))?;
        let desired: Value = serde_json::from_slice(desired)
            .map_err(|e| Error::config(format!("desired config is not JSON: {e}")))?;
        Ok(pointers
            .iter()
            .any(|p| observed.pointer(p) != desired.pointer(p)))
    })
}

/// Fields a master cannot change while running
pub const MASTER_RESTART_FIELDS: &[&str] = &["/rpc_port", "/primary_master"];

/// Fields an exec node cannot change while running
pub const EXEC_NODE_RESTART_FIELDS: &[&str] = &["/rpc_port", "/cluster_connection/primary_master"];

/// Parse a user override document; it must be a JSON object
pub fn parse_overrides(document: &str) -> Result<Value, Error> {
    match serde_json::from_str(document) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(Error::config("config override must be an object")),
        Err(e) => Err(Error::config(format!("config override is not JSON: {e}"))),
    }
}

/// Deep-merge `overrides` into `base`; objects merge key by key, anything
/// else in `overrides` replaces the base value
pub fn merge_overrides(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(slot) => merge_overrides(slot, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

/// Apply an override document to a rendered config
pub fn apply_overrides(rendered: &[u8], document: &str) -> Result<Vec<u8>, Error> {
    let overrides = parse_overrides(document)?;
    let mut config: Value = serde_json::from_slice(rendered)
        .map_err(|e| Error::config(format!("rendered config is not JSON: {e}")))?;
    merge_overrides(&mut config, &overrides);
    Generator::render(&config)
}

const MASTER_RPC_PORT: u16 = 9010;
const EXEC_NODE_RPC_PORT: u16 = 9012;
const CLUSTER_DOMAIN: &str = "cluster.local";

/// Random string over `[0-9a-zA-Z]`
pub fn rand_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Name of the master StatefulSet
pub fn master_workload_name() -> &'static str {
    "ms"
}

/// Name of the master headless service
pub fn master_service_name() -> &'static str {
    "masters"
}

/// Name of an exec node pool's StatefulSet
pub fn exec_nodes_workload_name(pool: &str) -> String {
    format_with_default("end", pool)
}

/// Name of an exec node pool's headless service
pub fn exec_nodes_service_name(pool: &str) -> String {
    format_with_default("exec-nodes", pool)
}

/// Renders configs for one Ytsaurus cluster
#[derive(Clone, Debug)]
pub struct Generator {
    cluster_name: String,
    namespace: String,
    spec: YtsaurusSpec,
}

impl Generator {
    /// Create a generator for the named cluster
    pub fn new(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        spec: YtsaurusSpec,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            spec,
        }
    }

    fn host(&self, pod: &str, service: &str) -> String {
        format!(
            "{pod}.{service}.{}.svc.{CLUSTER_DOMAIN}",
            self.namespace
        )
    }

    /// RPC addresses of every master replica
    pub fn master_addresses(&self) -> Vec<String> {
        (0..self.spec.masters.instance_count)
            .map(|i| {
                let pod = format!("{}-{i}", master_workload_name());
                format!("{}:{MASTER_RPC_PORT}", self.host(&pod, master_service_name()))
            })
            .collect()
    }

    /// Address of the HTTP proxies serving the given role
    pub fn http_proxies_address(&self, role: &str) -> String {
        let service = if role == DEFAULT_HTTP_PROXY_ROLE {
            "http-proxies".to_string()
        } else {
            format!("http-proxies-{role}")
        };
        format!("{service}.{}.svc.{CLUSTER_DOMAIN}", self.namespace)
    }

    fn primary_master(&self) -> Result<Value, Error> {
        let addresses = self.master_addresses();
        if addresses.is_empty() {
            return Err(Error::config("cluster has no master addresses"));
        }
        Ok(json!({
            "addresses": addresses,
            "cell_id": format!("{}-primary", self.cluster_name),
        }))
    }

    fn render(value: &Value) -> Result<Vec<u8>, Error> {
        serde_json::to_vec_pretty(value).map_err(|e| Error::config(e.to_string()))
    }

    /// Master server config
    pub fn master_config(&self) -> Result<Vec<u8>, Error> {
        Self::render(&json!({
            "rpc_port": MASTER_RPC_PORT,
            "primary_master": self.primary_master()?,
            "cluster_connection": { "cluster_name": self.cluster_name },
        }))
    }

    /// Exec node server config for one pool
    pub fn exec_node_config(&self, pool: &ExecNodesSpec) -> Result<Vec<u8>, Error> {
        Self::render(&json!({
            "rpc_port": EXEC_NODE_RPC_PORT,
            "cluster_connection": {
                "cluster_name": self.cluster_name,
                "primary_master": self.primary_master()?,
            },
            "flavors": ["exec"],
            "tags": [pool.name],
        }))
    }

    /// Web UI cluster description
    pub fn ui_config(&self) -> Result<Vec<u8>, Error> {
        Self::render(&json!({
            "clusters": [{
                "id": self.cluster_name,
                "name": self.cluster_name,
                "proxy": self.http_proxies_address(DEFAULT_HTTP_PROXY_ROLE),
            }],
        }))
    }

    /// Native client config mounted into init jobs
    pub fn native_client_config(&self) -> Result<Vec<u8>, Error> {
        Self::render(&json!({
            "driver": {
                "cluster_name": self.cluster_name,
                "primary_master": self.primary_master()?,
                "api_version": 4,
            },
            "address_resolver": { "enable_ipv4": true, "enable_ipv6": false },
        }))
    }

    /// Wrap a renderer into a [`ConfigGenerator`] bound to this generator
    pub fn bind<F>(self: &Arc<Self>, render: F) -> ConfigGenerator
    where
        F: Fn(&Generator) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
    {
        let this = Arc::clone(self);
        Arc::new(move || render(&this))
    }
}
