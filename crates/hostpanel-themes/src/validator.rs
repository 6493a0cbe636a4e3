//! Template manifest validation

use semver::Version;

use hostpanel_core::manifest::{outdated_target_warning, FieldErrors};

use crate::manifest::{TemplateManifest, CONTEXTS};
use crate::{Severity, ThemeWarning, WarningKind};

const NAME_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*$";
const MAX_NAME_LENGTH: usize = 50;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const MAX_AUTHOR_LENGTH: usize = 255;
const MAX_LICENSE_LENGTH: usize = 50;

#[derive(Debug, Clone)]
pub struct TemplateManifestValidator {
    host_version: Version,
}

impl TemplateManifestValidator {
    pub fn new(host_version: Version) -> Self {
        Self { host_version }
    }

    pub fn host_version(&self) -> &Version {
        &self.host_version
    }

    /// Every problem with the manifest, empty when it is valid
    pub fn validate(&self, manifest: &TemplateManifest) -> Vec<String> {
        let mut errors = FieldErrors::new();

        if let Some(name) = errors.required("name", manifest.name.as_deref()) {
            errors.max_len("name", name, MAX_NAME_LENGTH);
            errors.matches(
                "name",
                name,
                NAME_PATTERN,
                "lowercase alphanumeric with hyphens only (e.g. my-theme)",
            );
        }
        if let Some(version) = errors.required("version", manifest.version.as_deref()) {
            errors.semver("version", version);
        }
        if let Some(author) = errors.required("author", manifest.author.as_deref()) {
            errors.max_len("author", author, MAX_AUTHOR_LENGTH);
        }
        if let Some(description) = errors.required("description", manifest.description.as_deref()) {
            errors.max_len("description", description, MAX_DESCRIPTION_LENGTH);
        }
        if let Some(license) = errors.required("license", manifest.license.as_deref()) {
            errors.max_len("license", license, MAX_LICENSE_LENGTH);
        }
        if let Some(host_version) = errors.required("hostVersion", manifest.host_version.as_deref()) {
            errors.semver("hostVersion", host_version);
        }

        let contexts = manifest.contexts();
        if contexts.is_empty() {
            errors.push(format!(
                "At least one context required ({})",
                CONTEXTS.join(", ")
            ));
        } else {
            let invalid: Vec<&str> = contexts
                .iter()
                .map(String::as_str)
                .filter(|c| !CONTEXTS.contains(c))
                .collect();
            if !invalid.is_empty() {
                errors.push(format!(
                    "Invalid contexts: {}. Valid: {}",
                    invalid.join(", "),
                    CONTEXTS.join(", ")
                ));
            }
        }

        errors.into_vec()
    }

    /// Soft warning when the theme targets an older host than the running one
    pub fn outdated_warning(&self, manifest: &TemplateManifest) -> Option<ThemeWarning> {
        let target = manifest.host_version.as_deref()?;
        outdated_target_warning(&self.host_version, target).map(|message| {
            ThemeWarning::new(WarningKind::OutdatedHostVersion, Severity::Warning, message)
                .with_detail("theme_version", target)
                .with_detail("current_version", &self.host_version)
        })
    }
}
