//! Config map holding a component's generated config file

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use k8s_openapi::api::core::v1::ConfigMap;
use tracing::warn;

use crate::labeller::Labeller;
use crate::resources::{Managed, ObjectStore};
use crate::ytconfig::{self, ConfigGenerator, ReloadChecker};
use crate::Error;

/// Owns one config map with a single generated file
pub struct ConfigHelper {
    labeller: Labeller,
    file_name: String,
    generator: ConfigGenerator,
    reload_checker: ReloadChecker,
    config_map: Managed<ConfigMap>,
    // user-owned, only read
    overrides: Option<Managed<ConfigMap>>,
    // rendered once per instance; error kept as text since `Error` is not `Clone`
    content: OnceLock<Result<String, String>>,
}

impl std::fmt::Debug for ConfigHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHelper")
            .field("config_map", &self.config_map)
            .field("file_name", &self.file_name)
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl ConfigHelper {
    /// Create a helper for the named config map.
    ///
    /// Config changes are hot-reloaded unless a checker says otherwise.
    pub fn new(
        labeller: &Labeller,
        store: Arc<dyn ObjectStore>,
        name: &str,
        file_name: &str,
        generator: ConfigGenerator,
    ) -> Self {
        Self {
            labeller: labeller.clone(),
            file_name: file_name.to_string(),
            generator,
            reload_checker: ytconfig::hot_reload(),
            config_map: Managed::new(store, &labeller.namespace, name),
            overrides: None,
            content: OnceLock::new(),
        }
    }

    /// Merge the entry for this file from the named user config map
    pub fn with_overrides(mut self, store: Arc<dyn ObjectStore>, name: &str) -> Self {
        self.overrides = Some(Managed::new(store, &self.labeller.namespace, name));
        self
    }

    /// Use `checker` to tell reloadable changes from ones needing a restart
    pub fn with_reload_checker(mut self, checker: ReloadChecker) -> Self {
        self.reload_checker = checker;
        self
    }

    /// Load the stored config map and the overrides, if any
    pub async fn fetch(&mut self) -> Result<(), Error> {
        if let Some(overrides) = &mut self.overrides {
            overrides.fetch().await?;
        }
        self.config_map.fetch().await
    }

    /// Override document for this file; `None` when absent
    fn override_document(&self) -> Option<&str> {
        self.overrides
            .as_ref()
            .and_then(|m| m.observed())
            .and_then(|cm| cm.data.as_ref())
            .and_then(|data| data.get(&self.file_name))
            .map(String::as_str)
    }

    /// Fails when the override document for this file is not a JSON object.
    ///
    /// A missing overrides config map is not an error.
    pub fn check_overrides(&self) -> Result<(), Error> {
        match self.override_document() {
            Some(document) => ytconfig::parse_overrides(document).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Rendered config file content with overrides applied
    pub fn desired(&self) -> Result<&str, Error> {
        self.content
            .get_or_init(|| {
                let rendered = (self.generator)().map_err(|e| e.to_string())?;
                let merged = match self.override_document() {
                    Some(document) => {
                        ytconfig::apply_overrides(&rendered, document).map_err(|e| e.to_string())?
                    }
                    None => rendered,
                };
                String::from_utf8(merged).map_err(|e| e.to_string())
            })
            .as_deref()
            .map_err(|e| Error::config(format!("{}: {e}", self.config_map.key())))
    }

    /// Stored config file content
    pub fn observed(&self) -> Option<&str> {
        self.config_map
            .observed()
            .and_then(|cm| cm.data.as_ref())
            .and_then(|data| data.get(&self.file_name))
            .map(String::as_str)
    }

    /// Whether the config map is missing or holds different content.
    ///
    /// A generation failure also reports true so that the wet pass runs and
    /// surfaces the error.
    pub fn need_sync(&self) -> bool {
        match self.desired() {
            Ok(desired) => self.observed() != Some(desired),
            Err(e) => {
                warn!(config_map = %self.config_map.key(), error = %e, "config generation failed");
                true
            }
        }
    }

    /// Whether the stored config differs in a way running servers cannot reload.
    ///
    /// False when nothing is stored yet or the desired config cannot be
    /// rendered. A failing checker counts as a restart.
    pub fn need_restart(&self) -> bool {
        let (Some(observed), Ok(desired)) = (self.observed(), self.desired()) else {
            return false;
        };
        if observed == desired {
            return false;
        }
        match (self.reload_checker)(observed.as_bytes(), desired.as_bytes()) {
            Ok(restart) => restart,
            Err(e) => {
                warn!(config_map = %self.config_map.key(), error = %e, "reload check failed");
                true
            }
        }
    }

    /// Desired config map
    pub fn build(&self) -> Result<ConfigMap, Error> {
        let content = self.desired()?;
        Ok(ConfigMap {
            metadata: self.labeller.object_meta(self.config_map.name()),
            data: Some(BTreeMap::from([(
                self.file_name.clone(),
                content.to_string(),
            )])),
            ..Default::default()
        })
    }

    /// Apply the desired config map
    pub async fn sync(&self) -> Result<(), Error> {
        let desired = self.build()?;
        self.config_map.apply(&desired).await
    }
}
