use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use hostpanel_core::Result;

use super::jsonl::JsonlFile;
use crate::entity::Plugin;
use crate::ports::SettingsStore;

pub const SETTINGS_FILE: &str = "plugin_settings.jsonl";

/// One persisted plugin setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    pub plugin: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Plugin settings stored as `plugin_settings.jsonl` in the data directory
pub struct JsonlSettingsStore {
    file: JsonlFile<SettingRecord>,
    write_lock: Mutex<()>,
}

impl JsonlSettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file: JsonlFile::new(data_dir.join(SETTINGS_FILE)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn settings_for(&self, plugin_name: &str) -> Result<Vec<SettingRecord>> {
        Ok(self
            .file
            .read_all()?
            .into_iter()
            .filter(|s| s.plugin == plugin_name)
            .collect())
    }
}

impl SettingsStore for JsonlSettingsStore {
    fn initialize_defaults(&self, plugin: &Plugin) -> Result<usize> {
        let schema = plugin.parsed_manifest().config_schema;
        if schema.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.file.read_all()?;
        let mut created = 0;
        for definition in schema {
            let exists = records
                .iter()
                .any(|r| r.plugin == plugin.name && r.key == definition.key);
            if exists {
                continue;
            }
            records.push(SettingRecord {
                plugin: plugin.name.clone(),
                key: definition.key,
                kind: definition.kind,
                value: definition.default.unwrap_or(serde_json::Value::Null),
                created_at: Utc::now(),
            });
            created += 1;
        }

        if created > 0 {
            records.sort_by(|a, b| (&a.plugin, &a.key).cmp(&(&b.plugin, &b.key)));
            self.file.write_all(&records)?;
        }
        Ok(created)
    }

    fn delete_all(&self, plugin_name: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.file.read_all()?;
        let before = records.len();
        records.retain(|r| r.plugin != plugin_name);
        let removed = before - records.len();
        if removed > 0 {
            self.file.write_all(&records)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginManifest;
    use tempfile::TempDir;

    fn plugin_with_schema() -> Plugin {
        let manifest = PluginManifest::from_json(
            r#"{"name": "tickets", "version": "1.0.0", "config_schema": [
                {"key": "per_page", "type": "integer", "default": 25},
                {"key": "notify_email"}
            ]}"#,
        )
        .unwrap();
        Plugin::from_manifest("/srv/plugins/tickets", &manifest)
    }

    #[test]
    fn initializes_only_missing_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlSettingsStore::new(tmp.path());
        let plugin = plugin_with_schema();

        assert_eq!(store.initialize_defaults(&plugin).unwrap(), 2);
        assert_eq!(store.initialize_defaults(&plugin).unwrap(), 0);

        let settings = store.settings_for("tickets").unwrap();
        assert_eq!(settings.len(), 2);
        let per_page = settings.iter().find(|s| s.key == "per_page").unwrap();
        assert_eq!(per_page.value, serde_json::json!(25));
        assert_eq!(per_page.kind, "integer");
    }

    #[test]
    fn delete_all_removes_only_that_plugin() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlSettingsStore::new(tmp.path());
        store.initialize_defaults(&plugin_with_schema()).unwrap();

        assert_eq!(store.delete_all("other").unwrap(), 0);
        assert_eq!(store.delete_all("tickets").unwrap(), 2);
        assert!(store.settings_for("tickets").unwrap().is_empty());
    }
}
