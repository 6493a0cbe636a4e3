use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use hostpanel_core::Result;

use crate::entity::{Plugin, PluginState};
use crate::ports::{PluginRepository, SettingsStore};

/// Process-local plugin repository
#[derive(Debug, Default)]
pub struct InMemoryPluginRepository {
    plugins: RwLock<BTreeMap<String, Plugin>>,
}

impl InMemoryPluginRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginRepository for InMemoryPluginRepository {
    fn find_by_name(&self, name: &str) -> Result<Option<Plugin>> {
        Ok(self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    fn find_all(&self) -> Result<Vec<Plugin>> {
        Ok(self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    fn find_by_state(&self, state: PluginState) -> Result<Vec<Plugin>> {
        Ok(self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| p.state() == state)
            .cloned()
            .collect())
    }

    fn count_by_state(&self, state: PluginState) -> Result<usize> {
        Ok(self.find_by_state(state)?.len())
    }

    fn save(&self, plugin: &Plugin) -> Result<()> {
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plugin.name.clone(), plugin.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        Ok(self
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some())
    }
}

/// Process-local settings, keyed by `(plugin, key)`
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<BTreeMap<(String, String), serde_json::Value>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a setting directly, e.g. one left over from an earlier install
    pub fn insert(&self, plugin: &str, key: &str, value: serde_json::Value) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((plugin.to_string(), key.to_string()), value);
    }

    pub fn keys_for(&self, plugin: &str) -> BTreeSet<String> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(p, _)| p == plugin)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn initialize_defaults(&self, plugin: &Plugin) -> Result<usize> {
        let schema = plugin.parsed_manifest().config_schema;
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut created = 0;
        for definition in schema {
            let key = (plugin.name.clone(), definition.key.clone());
            if !settings.contains_key(&key) {
                settings.insert(key, definition.default.unwrap_or(serde_json::Value::Null));
                created += 1;
            }
        }
        Ok(created)
    }

    fn delete_all(&self, plugin_name: &str) -> Result<usize> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let before = settings.len();
        settings.retain(|(plugin, _), _| plugin != plugin_name);
        Ok(before - settings.len())
    }
}
