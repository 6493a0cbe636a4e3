//! Plugin manifest (`plugin.json`) loading

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{PluginError, PluginResult};

pub const MANIFEST_FILE: &str = "plugin.json";
const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

/// Parsed plugin manifest
///
/// Every field is optional at the serde level so that a missing field is
/// reported by the validator alongside every other problem instead of
/// aborting the parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginManifest {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub license: String,
    pub compatibility: HostCompatibility,
    /// Plugin name -> version constraint
    pub requires: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    pub config_schema: Vec<SettingDefinition>,
    /// The manifest exactly as it was read from disk
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// Host application versions a plugin supports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCompatibility {
    pub min: Option<String>,
    pub max: Option<String>,
}

/// A configurable setting declared by a plugin, initialized on registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDefinition {
    pub key: String,
    #[serde(rename = "type", default = "default_setting_type")]
    pub kind: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_setting_type() -> String {
    "string".to_string()
}

impl PluginManifest {
    /// Display name, falling back to the plugin name
    pub fn display_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Parse a manifest from JSON text
    pub fn from_json(data: &str) -> PluginResult<Self> {
        let raw: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| PluginError::InvalidManifest(vec![format!("Invalid manifest JSON: {e}")]))?;
        if !raw.is_object() {
            return Err(PluginError::InvalidManifest(vec![
                "Manifest root must be a JSON object".to_string(),
            ]));
        }

        let mut manifest: PluginManifest = serde_json::from_value(raw.clone())
            .map_err(|e| PluginError::InvalidManifest(vec![format!("Invalid manifest: {e}")]))?;
        manifest.raw = raw;
        Ok(manifest)
    }
}

/// Load `plugin.json` from a plugin directory
///
/// Symlinked manifests and manifests over 64 KB are rejected.
pub fn load_manifest(plugin_dir: &Path) -> PluginResult<PluginManifest> {
    let path = plugin_dir.join(MANIFEST_FILE);

    let metadata = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PluginError::InvalidManifest(vec![format!(
                "Missing {} in {}",
                MANIFEST_FILE,
                plugin_dir.display()
            )]));
        }
        Err(e) => return Err(PluginError::IoError(e)),
    };
    if metadata.file_type().is_symlink() {
        return Err(PluginError::InvalidManifest(vec![
            "Plugin manifests cannot be symlinks".to_string(),
        ]));
    }
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(PluginError::InvalidManifest(vec![
            "Manifest file too large".to_string(),
        ]));
    }

    let data = fs::read_to_string(&path)?;
    PluginManifest::from_json(&data)
}
