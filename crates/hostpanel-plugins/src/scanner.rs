//! Filesystem discovery of plugin directories
//!
//! Scanning has no side effects: every candidate directory is reported with
//! its parsed manifest or the reasons it could not be used.

use std::fs;
use std::path::{Path, PathBuf};

use crate::PluginResult;
use crate::manifest::{PluginManifest, load_manifest};
use crate::validator::PluginManifestValidator;

/// One candidate plugin directory
#[derive(Debug, Clone)]
pub struct ScannedPlugin {
    /// Directory name
    pub name: String,
    pub path: PathBuf,
    pub manifest: Option<PluginManifest>,
    pub errors: Vec<String>,
}

impl ScannedPlugin {
    pub fn is_valid(&self) -> bool {
        self.manifest.is_some() && self.errors.is_empty()
    }
}

pub struct PluginScanner {
    plugins_dir: PathBuf,
    validator: PluginManifestValidator,
}

impl PluginScanner {
    pub fn new(plugins_dir: impl Into<PathBuf>, validator: PluginManifestValidator) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            validator,
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn validator(&self) -> &PluginManifestValidator {
        &self.validator
    }

    /// Expected location of a plugin
    pub fn plugin_path(&self, name: &str) -> PathBuf {
        self.plugins_dir.join(name)
    }

    /// Scan every directory under the plugins directory, ordered by name
    ///
    /// A missing plugins directory yields no candidates.
    pub fn scan(&self) -> PluginResult<Vec<ScannedPlugin>> {
        if !self.plugins_dir.exists() {
            tracing::debug!(dir = %self.plugins_dir.display(), "Plugins directory does not exist");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.plugins_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                found.push(ScannedPlugin {
                    name,
                    path: entry.path(),
                    manifest: None,
                    errors: vec!["Plugin directories cannot be symlinks".to_string()],
                });
                continue;
            }
            if !file_type.is_dir() {
                continue;
            }

            found.push(self.scan_plugin(&entry.path()));
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(count = found.len(), "Scanned plugins directory");
        Ok(found)
    }

    /// Parse and validate a single plugin directory
    pub fn scan_plugin(&self, dir: &Path) -> ScannedPlugin {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match load_manifest(dir) {
            Ok(manifest) => {
                let mut errors = self.validator.validate(&manifest);
                if let Some(mismatch) = self.validator.validate_directory_name(&name, &manifest) {
                    errors.push(mismatch);
                }
                ScannedPlugin {
                    name,
                    path: dir.to_path_buf(),
                    manifest: Some(manifest),
                    errors,
                }
            }
            Err(crate::PluginError::InvalidManifest(errors)) => ScannedPlugin {
                name,
                path: dir.to_path_buf(),
                manifest: None,
                errors,
            },
            Err(e) => ScannedPlugin {
                name,
                path: dir.to_path_buf(),
                manifest: None,
                errors: vec![e.to_string()],
            },
        }
    }

    /// Only candidates with a valid manifest
    pub fn scan_valid(&self) -> PluginResult<Vec<(PathBuf, PluginManifest)>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(ScannedPlugin::is_valid)
            .filter_map(|p| p.manifest.map(|m| (p.path, m)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_plugin;
    use semver::Version;
    use tempfile::TempDir;

    fn scanner(dir: &Path) -> PluginScanner {
        PluginScanner::new(dir, PluginManifestValidator::new(Version::new(0, 6, 0)))
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(scanner(&tmp.path().join("nope")).scan().unwrap().is_empty());
    }

    #[test]
    fn reports_valid_and_invalid_candidates() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "tickets", "1.0.0", &[]);
        write_plugin(tmp.path(), "reports", "2.0.0", &[("tickets", "^1.0")]);
        fs::create_dir_all(tmp.path().join("no-manifest")).unwrap();
        fs::create_dir_all(tmp.path().join("broken")).unwrap();
        fs::write(tmp.path().join("broken/plugin.json"), "{ nope").unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join("README.md"), "not a plugin").unwrap();

        let scanned = scanner(tmp.path()).scan().unwrap();
        let names: Vec<&str> = scanned.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["broken", "no-manifest", "reports", "tickets"]);

        assert!(!scanned[0].is_valid());
        assert!(scanned[0].errors[0].contains("Invalid manifest JSON"));
        assert!(scanned[1].errors[0].contains("Missing plugin.json"));
        assert!(scanned[2].is_valid());

        let valid = scanner(tmp.path()).scan_valid().unwrap();
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn directory_must_match_manifest_name() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "tickets", "1.0.0", &[]);
        fs::rename(tmp.path().join("tickets"), tmp.path().join("helpdesk")).unwrap();

        let scanned = scanner(tmp.path()).scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].errors.iter().any(|e| e.contains("does not match")));
    }
}
