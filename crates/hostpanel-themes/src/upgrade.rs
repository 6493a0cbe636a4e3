//! Legacy theme upgrade to the context-based layout
//!
//! A theme is legacy when its manifest has no `contexts` key. Upgrading
//! moves the old top-level templates under `panel/`, takes `landing/` (and
//! assets, if missing) from the default theme, and rewrites `template.json`.
//! Every step is a no-op when its work is already done, so a retried
//! upgrade converges.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostpanel_core::fs::Filesystem;
use semver::Version;
use serde_json::json;

use crate::manifest::{parse_document, CONTEXTS, ROOT_KEY, TEMPLATE_FILE};
use crate::{ThemeDirs, ThemeError, ThemeResult};

pub const DEFAULT_THEME: &str = "default";

/// Top-level items of a legacy theme that belong to the panel context
pub const LEGACY_PANEL_ITEMS: [&str; 6] = [
    "_partials",
    "bundles",
    "components",
    "form",
    "sso",
    "base.html.twig",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpgradeReport {
    pub theme: String,
    pub backup_path: Option<PathBuf>,
    /// Legacy items moved under `panel/`
    pub moved: Vec<String>,
    /// Assets were copied from the default theme
    pub assets_copied: bool,
    /// The theme already used the context-based layout; nothing was touched
    pub already_upgraded: bool,
}

pub struct ThemeUpgradeService {
    dirs: ThemeDirs,
    fs: Arc<dyn Filesystem>,
    host_version: Version,
    default_theme: String,
}

impl ThemeUpgradeService {
    pub fn new(dirs: ThemeDirs, fs: Arc<dyn Filesystem>, host_version: Version) -> Self {
        Self {
            dirs,
            fs,
            host_version,
            default_theme: DEFAULT_THEME.to_string(),
        }
    }

    pub fn with_default_theme(mut self, name: impl Into<String>) -> Self {
        self.default_theme = name.into();
        self
    }

    fn read_document(&self, theme_path: &Path) -> ThemeResult<serde_json::Value> {
        let text = self.fs.read_to_string(&theme_path.join(TEMPLATE_FILE))?;
        parse_document(&text)
    }

    /// The `template` object of a theme's manifest, as written on disk
    fn raw_template(&self, name: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.read_document(&self.dirs.theme_path(name))
            .ok()?
            .get(ROOT_KEY)?
            .as_object()
            .cloned()
    }

    /// Theme directory exists and carries a non-empty manifest
    pub fn is_valid_theme(&self, name: &str) -> bool {
        self.fs.exists(&self.dirs.theme_path(name))
            && self.raw_template(name).is_some_and(|template| !template.is_empty())
    }

    pub fn needs_upgrade(&self, name: &str) -> ThemeResult<bool> {
        let template = self
            .raw_template(name)
            .ok_or_else(|| ThemeError::NotFound(name.to_string()))?;
        Ok(template.get("contexts").is_none_or(serde_json::Value::is_null))
    }

    /// Mirror the theme to `{name}_backup`, or a timestamped sibling if that exists
    pub fn create_backup(&self, name: &str) -> ThemeResult<PathBuf> {
        let mut backup = self.dirs.theme_path(&format!("{}_backup", name));
        if self.fs.exists(&backup) {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            backup = self.dirs.theme_path(&format!("{}_backup_{}", name, stamp));
        }
        self.fs.mirror(&self.dirs.theme_path(name), &backup)?;
        tracing::info!(theme = %name, backup = %backup.display(), "Created theme backup");
        Ok(backup)
    }

    pub fn restore_from_backup(&self, name: &str, backup: &Path) -> ThemeResult<()> {
        if !self.fs.exists(backup) {
            return Err(ThemeError::InvalidStructure {
                message: format!("Backup path {} does not exist", backup.display()),
                errors: Vec::new(),
            });
        }
        let theme_path = self.dirs.theme_path(name);
        self.fs.remove(&theme_path)?;
        self.fs.mirror(backup, &theme_path)?;
        tracing::info!(theme = %name, backup = %backup.display(), "Restored theme from backup");
        Ok(())
    }

    pub fn create_landing_folder(&self, theme_path: &Path) -> ThemeResult<()> {
        let landing = theme_path.join("landing");
        if !self.fs.exists(&landing) {
            self.fs.mkdir(&landing)?;
        }
        Ok(())
    }

    /// Move legacy top-level items under `panel/`, skipping absent ones
    pub fn move_files_to_panel(&self, theme_path: &Path) -> ThemeResult<Vec<String>> {
        let panel = theme_path.join("panel");
        let mut moved = Vec::new();
        for item in LEGACY_PANEL_ITEMS {
            let source = theme_path.join(item);
            if !self.fs.exists(&source) {
                continue;
            }
            self.fs.rename(&source, &panel.join(item))?;
            tracing::debug!(item, "Moved legacy item into panel context");
            moved.push(item.to_string());
        }
        Ok(moved)
    }

    /// Replace `landing/` with the default theme's copy
    pub fn copy_landing_from_default(&self, theme_path: &Path) -> ThemeResult<()> {
        let source = self.dirs.theme_path(&self.default_theme).join("landing");
        let target = theme_path.join("landing");
        if !self.fs.exists(&source) {
            return Err(ThemeError::MissingDefault {
                what: "landing folder",
                path: source.display().to_string(),
            });
        }
        if source == target {
            return Ok(());
        }
        self.fs.remove(&target)?;
        self.fs.mirror(&source, &target)?;
        Ok(())
    }

    /// Copy the default theme's assets when the theme has none. Returns whether it copied.
    pub fn copy_assets_if_needed(&self, name: &str) -> ThemeResult<bool> {
        let assets = self.dirs.assets_path(name);
        if self.fs.exists(&assets) {
            return Ok(false);
        }
        let source = self.dirs.assets_path(&self.default_theme);
        if !self.fs.exists(&source) {
            return Err(ThemeError::MissingDefault {
                what: "assets",
                path: source.display().to_string(),
            });
        }
        self.fs.mirror(&source, &assets)?;
        Ok(true)
    }

    /// Declare all contexts, ensure `translations`, and record the running host version
    pub fn update_manifest(&self, theme_path: &Path) -> ThemeResult<()> {
        let mut document = self.read_document(theme_path)?;
        let template = document
            .get_mut(ROOT_KEY)
            .and_then(serde_json::Value::as_object_mut)
            .ok_or_else(|| {
                ThemeError::invalid_manifest(format!("{} must have \"{}\" root key", TEMPLATE_FILE, ROOT_KEY))
            })?;

        template.insert("contexts".to_string(), json!(CONTEXTS));
        template.entry("translations").or_insert_with(|| json!([]));
        template.insert("hostVersion".to_string(), json!(self.host_version.to_string()));

        let mut bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| ThemeError::invalid_manifest(format!("Failed to encode {}: {}", TEMPLATE_FILE, e)))?;
        bytes.push(b'\n');
        self.fs.dump_file(&theme_path.join(TEMPLATE_FILE), &bytes)?;
        Ok(())
    }

    pub fn validate_upgrade(&self, theme_path: &Path) -> ThemeResult<()> {
        let mut errors = Vec::new();
        if !self.fs.exists(&theme_path.join("landing")) {
            errors.push("Landing folder was not created".to_string());
        }
        if !self.fs.exists(&theme_path.join("panel")) {
            errors.push("Panel folder does not exist".to_string());
        }
        for required in ["bundles", "components"] {
            if !self.fs.exists(&theme_path.join("panel").join(required)) {
                errors.push(format!("Required item '{}' not found in panel context", required));
            }
        }
        let has_contexts = self
            .read_document(theme_path)
            .ok()
            .and_then(|doc| doc.get(ROOT_KEY).and_then(|t| t.get("contexts")).cloned())
            .is_some_and(|contexts| !contexts.is_null());
        if !has_contexts {
            errors.push(format!("{} was not updated with contexts field", TEMPLATE_FILE));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ThemeError::InvalidStructure {
                message: "Upgrade validation failed".to_string(),
                errors,
            })
        }
    }

    /// Upgrade a legacy theme, restoring it from backup if any step fails
    pub fn upgrade(&self, name: &str, backup: bool) -> ThemeResult<UpgradeReport> {
        if !self.is_valid_theme(name) {
            return Err(ThemeError::NotFound(name.to_string()));
        }
        if !self.needs_upgrade(name)? {
            tracing::info!(theme = %name, "Theme already uses the context-based layout");
            return Ok(UpgradeReport {
                theme: name.to_string(),
                already_upgraded: true,
                ..Default::default()
            });
        }

        tracing::info!(theme = %name, backup, "Upgrading theme");
        let mut report = UpgradeReport {
            theme: name.to_string(),
            ..Default::default()
        };
        if backup {
            report.backup_path = Some(self.create_backup(name).map_err(|e| wrap(name, e))?);
        } else {
            tracing::warn!(theme = %name, "Upgrading without a backup");
        }

        match self.apply_steps(name, &mut report) {
            Ok(()) => {
                tracing::info!(theme = %name, moved = report.moved.len(), "Theme upgraded");
                Ok(report)
            }
            Err(e) => {
                tracing::error!(theme = %name, error = %e, "Theme upgrade failed");
                self.rollback(name, &report);
                Err(wrap(name, e))
            }
        }
    }

    fn apply_steps(&self, name: &str, report: &mut UpgradeReport) -> ThemeResult<()> {
        let theme_path = self.dirs.theme_path(name);
        self.create_landing_folder(&theme_path)?;
        report.moved = self.move_files_to_panel(&theme_path)?;
        self.copy_landing_from_default(&theme_path)?;
        report.assets_copied = self.copy_assets_if_needed(name)?;
        self.update_manifest(&theme_path)?;
        self.validate_upgrade(&theme_path)
    }

    fn rollback(&self, name: &str, report: &UpgradeReport) {
        if let Some(backup) = &report.backup_path {
            if let Err(e) = self.restore_from_backup(name, backup) {
                tracing::error!(theme = %name, backup = %backup.display(), error = %e, "Rollback from backup failed");
            }
        }
        if report.assets_copied {
            let assets = self.dirs.assets_path(name);
            if let Err(e) = self.fs.remove(&assets) {
                tracing::warn!(path = %assets.display(), error = %e, "Failed to remove copied assets");
            }
        }
    }
}

fn wrap(theme: &str, source: ThemeError) -> ThemeError {
    ThemeError::Upgrade {
        theme: theme.to_string(),
        source: Box::new(source),
    }
}
