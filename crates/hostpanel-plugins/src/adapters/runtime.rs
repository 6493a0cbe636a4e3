use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use crate::entity::Plugin;
use crate::manifest::load_manifest;
use crate::ports::RuntimeLoader;
use crate::{PluginError, PluginResult};

/// Loader that re-reads the manifest from disk before registering a plugin
///
/// Refuses to load a plugin whose directory disappeared or whose on-disk
/// version no longer matches the registered record.
#[derive(Debug, Default)]
pub struct ManifestRuntimeLoader {
    loaded: RwLock<BTreeSet<String>>,
}

impl ManifestRuntimeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl RuntimeLoader for ManifestRuntimeLoader {
    fn load(&self, plugin: &Plugin) -> PluginResult<()> {
        if !plugin.path.is_dir() {
            return Err(PluginError::runtime(
                &plugin.name,
                format!("plugin directory {} is missing", plugin.path.display()),
            ));
        }

        let on_disk = load_manifest(&plugin.path)?;
        if on_disk.version != plugin.version {
            return Err(PluginError::runtime(
                &plugin.name,
                format!(
                    "on-disk version {} differs from registered version {}; run discovery first",
                    on_disk.version, plugin.version
                ),
            ));
        }

        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plugin.name.clone());
        tracing::debug!(plugin = %plugin.name, capabilities = ?plugin.capabilities, "Plugin loaded");
        Ok(())
    }

    fn unload(&self, plugin: &Plugin) -> PluginResult<()> {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&plugin.name);
        tracing::debug!(plugin = %plugin.name, "Plugin unloaded");
        Ok(())
    }
}
