//! Plugin manifest validation

use semver::Version;
use std::collections::HashSet;

use hostpanel_core::manifest::{FieldErrors, check_host_range};
use hostpanel_core::version;

use crate::manifest::PluginManifest;

/// Lowercase alphanumeric segments joined by single `-` or `_`
pub const PLUGIN_NAME_PATTERN: &str = r"^[a-z0-9]+([-_][a-z0-9]+)*$";

const MAX_NAME_LEN: usize = 100;
const MAX_DISPLAY_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_AUTHOR_LEN: usize = 255;
const MAX_LICENSE_LEN: usize = 50;

/// Validates plugin manifests against syntax rules and the running host version
///
/// Rules:
/// - name, version, author and description are required
/// - name matches [`PLUGIN_NAME_PATTERN`]
/// - version and both compatibility bounds are semantic versions, min <= max
/// - every `requires` entry names a valid plugin and carries a parseable constraint
/// - config schema keys are non-empty and unique
#[derive(Debug, Clone)]
pub struct PluginManifestValidator {
    host_version: Version,
}

impl PluginManifestValidator {
    pub fn new(host_version: Version) -> Self {
        Self { host_version }
    }

    pub fn host_version(&self) -> &Version {
        &self.host_version
    }

    /// Syntactic validation. An empty list means the manifest is well-formed.
    pub fn validate(&self, manifest: &PluginManifest) -> Vec<String> {
        let mut errors = FieldErrors::new();

        if let Some(name) = errors.required("name", Some(&manifest.name)) {
            errors.max_len("name", name, MAX_NAME_LEN);
            errors.matches(
                "name",
                name,
                PLUGIN_NAME_PATTERN,
                "use lowercase letters, digits, and single '-' or '_' separators",
            );
        }
        if let Some(v) = errors.required("version", Some(&manifest.version)) {
            errors.semver("version", v);
        }
        if let Some(author) = errors.required("author", Some(&manifest.author)) {
            errors.max_len("author", author, MAX_AUTHOR_LEN);
        }
        if let Some(description) = errors.required("description", Some(&manifest.description)) {
            errors.max_len("description", description, MAX_DESCRIPTION_LEN);
        }
        errors.max_len("display_name", &manifest.display_name, MAX_DISPLAY_NAME_LEN);
        errors.max_len("license", &manifest.license, MAX_LICENSE_LEN);

        let min = manifest
            .compatibility
            .min
            .as_deref()
            .and_then(|v| errors.semver("compatibility.min", v));
        let max = manifest
            .compatibility
            .max
            .as_deref()
            .and_then(|v| errors.semver("compatibility.max", v));
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                errors.push(format!(
                    "compatibility.min ({}) must not be greater than compatibility.max ({})",
                    min, max
                ));
            }
        }

        let sample = Version::new(0, 0, 0);
        for (name, constraint) in &manifest.requires {
            errors.matches(
                &format!("requires.{}", name),
                name,
                PLUGIN_NAME_PATTERN,
                "not a valid plugin name",
            );
            if version::satisfies(&sample, constraint).is_err() {
                errors.push(format!(
                    "Invalid version constraint '{}' for required plugin '{}'",
                    constraint, name
                ));
            }
        }

        let mut keys = HashSet::new();
        for setting in &manifest.config_schema {
            if setting.key.trim().is_empty() {
                errors.push("config_schema entries must have a key");
            } else if !keys.insert(setting.key.as_str()) {
                errors.push(format!("Duplicate config_schema key '{}'", setting.key));
            }
        }

        errors.into_vec()
    }

    /// Whether the running host version lies in the declared range
    pub fn check_compatibility(&self, manifest: &PluginManifest) -> Result<(), String> {
        check_host_range(
            &self.host_version,
            manifest.compatibility.min.as_deref(),
            manifest.compatibility.max.as_deref(),
        )
    }

    /// The plugin directory must be named after the plugin
    pub fn validate_directory_name(&self, dir_name: &str, manifest: &PluginManifest) -> Option<String> {
        (!manifest.name.is_empty() && dir_name != manifest.name).then(|| {
            format!(
                "Directory name '{}' does not match manifest name '{}'",
                dir_name, manifest.name
            )
        })
    }
}
