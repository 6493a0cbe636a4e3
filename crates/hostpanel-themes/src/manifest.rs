//! Template manifest (`template.json`) parsing
//!
//! The file holds a single root object under the `template` key. Fields are
//! optional at the serde level so the validator can report every missing
//! field at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{ThemeError, ThemeResult};

pub const TEMPLATE_FILE: &str = "template.json";
pub const ROOT_KEY: &str = "template";

/// The three template domains a theme can serve
pub const CONTEXTS: [&str; 3] = ["panel", "landing", "email"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateManifest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub license: Option<String>,
    /// Host version the theme was built against
    pub host_version: Option<String>,
    /// `None` marks a legacy (pre-context) theme
    pub contexts: Option<Vec<String>>,
    /// Declared locale codes
    pub translations: Vec<String>,
    pub options: ThemeOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThemeOptions {
    pub support_dark_mode: bool,
    pub support_custom_colors: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TemplateManifest {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or_default()
    }

    /// Declared contexts, empty for legacy manifests
    pub fn contexts(&self) -> &[String] {
        self.contexts.as_deref().unwrap_or_default()
    }

    pub fn supports_context(&self, context: &str) -> bool {
        self.contexts().iter().any(|c| c == context)
    }

    /// Build a manifest from a whole `template.json` document
    pub fn from_document(document: &serde_json::Value) -> ThemeResult<Self> {
        let template = document.get(ROOT_KEY).ok_or_else(|| {
            ThemeError::invalid_manifest(format!("{} must have \"{}\" root key", TEMPLATE_FILE, ROOT_KEY))
        })?;
        serde_json::from_value(template.clone())
            .map_err(|e| ThemeError::invalid_manifest(format!("Invalid {} structure: {}", TEMPLATE_FILE, e)))
    }
}

/// Parse the text of a `template.json` file into a JSON document
pub fn parse_document(text: &str) -> ThemeResult<serde_json::Value> {
    let document: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ThemeError::invalid_manifest(format!("Invalid JSON in {}: {}", TEMPLATE_FILE, e)))?;
    if !document.is_object() {
        return Err(ThemeError::invalid_manifest(format!(
            "{} root must be a JSON object",
            TEMPLATE_FILE
        )));
    }
    Ok(document)
}

/// Read `template.json` from a theme root as a raw document
pub fn read_document(theme_root: &Path) -> ThemeResult<serde_json::Value> {
    let path = theme_root.join(TEMPLATE_FILE);
    if !path.is_file() {
        return Err(ThemeError::invalid_manifest(format!(
            "{} not found in theme root",
            TEMPLATE_FILE
        )));
    }
    let text = fs::read_to_string(&path)
        .map_err(|e| ThemeError::invalid_manifest(format!("Failed to read {}: {}", TEMPLATE_FILE, e)))?;
    parse_document(&text)
}

/// Read and parse the manifest of the theme rooted at `theme_root`
pub fn load_manifest(theme_root: &Path) -> ThemeResult<TemplateManifest> {
    TemplateManifest::from_document(&read_document(theme_root)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parses_camel_case_fields_and_options() {
        let manifest = TemplateManifest::from_document(&json!({
            "template": {
                "name": "aurora",
                "version": "1.2.0",
                "hostVersion": "0.6.0",
                "contexts": ["panel", "email"],
                "translations": ["en", "pl"],
                "options": {"supportDarkMode": true, "accentColor": "#ff8800"}
            }
        }))
        .unwrap();

        assert_eq!(manifest.name(), "aurora");
        assert_eq!(manifest.host_version.as_deref(), Some("0.6.0"));
        assert!(manifest.supports_context("email"));
        assert!(!manifest.supports_context("landing"));
        assert!(manifest.options.support_dark_mode);
        assert!(!manifest.options.support_custom_colors);
        assert_eq!(manifest.options.extra["accentColor"], json!("#ff8800"));
    }

    #[test]
    fn legacy_manifest_has_no_contexts() {
        let manifest = TemplateManifest::from_document(&json!({"template": {"name": "old"}})).unwrap();
        assert!(manifest.contexts.is_none());
        assert!(manifest.contexts().is_empty());
    }

    #[test]
    fn rejects_missing_root_key() {
        let err = TemplateManifest::from_document(&json!({"name": "aurora"})).unwrap_err();
        assert!(err.to_string().contains("\"template\" root key"));
        assert_eq!(err.code(), "E708");
    }

    #[test]
    fn reports_missing_file_and_bad_json() {
        let tmp = TempDir::new().unwrap();
        let err = load_manifest(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("template.json not found"));

        fs::write(tmp.path().join(TEMPLATE_FILE), "{not json").unwrap();
        let err = load_manifest(tmp.path()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON in template.json"));
    }
}
