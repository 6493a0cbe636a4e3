//! Installed theme listing and lookup

use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use hostpanel_core::config::ThemesConfig;

use crate::manifest::{load_manifest, read_document, TemplateManifest, CONTEXTS, ROOT_KEY, TEMPLATE_FILE};
use crate::{ThemeDirs, ThemeError, ThemeResult};

/// An installed theme with its activation state
#[derive(Debug, Clone, Serialize)]
pub struct Theme {
    pub name: String,
    pub manifest: TemplateManifest,
    pub path: PathBuf,
    pub assets_path: Option<PathBuf>,
    /// Used by at least one context
    pub is_active: bool,
    /// Contexts configured to render with this theme
    pub active_contexts: Vec<String>,
    pub needs_upgrade: bool,
}

impl Theme {
    pub fn supports_context(&self, context: &str) -> bool {
        self.manifest.supports_context(context)
    }

    pub fn supports_dark_mode(&self) -> bool {
        self.manifest.options.support_dark_mode
    }

    pub fn supports_custom_colors(&self) -> bool {
        self.manifest.options.support_custom_colors
    }
}

fn is_backup_dir(name: &str) -> bool {
    name.contains("_backup")
}

pub struct ThemeCatalog {
    dirs: ThemeDirs,
    settings: ThemesConfig,
}

impl ThemeCatalog {
    pub fn new(dirs: ThemeDirs, settings: ThemesConfig) -> Self {
        Self { dirs, settings }
    }

    /// Every theme with a readable manifest, sorted by name. Upgrade backups are skipped.
    pub fn list(&self) -> ThemeResult<Vec<Theme>> {
        let entries = match fs::read_dir(&self.dirs.themes_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !is_backup_dir(name))
            .collect();
        names.sort();

        let mut themes = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name) {
                Ok(theme) => themes.push(theme),
                Err(e) => tracing::debug!(theme = %name, error = %e, "Skipping directory without a valid manifest"),
            }
        }
        Ok(themes)
    }

    pub fn get(&self, name: &str) -> ThemeResult<Theme> {
        let path = self.dirs.theme_path(name);
        if !path.is_dir() {
            return Err(ThemeError::NotFound(name.to_string()));
        }
        let document = read_document(&path)?;
        let manifest = TemplateManifest::from_document(&document)?;
        let needs_upgrade = document
            .get(ROOT_KEY)
            .and_then(|t| t.get("contexts"))
            .is_none_or(serde_json::Value::is_null);

        let active_contexts: Vec<String> = CONTEXTS
            .iter()
            .filter(|context| self.settings.theme_for_context(context) == Some(name))
            .map(|context| context.to_string())
            .collect();
        let assets = self.dirs.assets_path(name);

        Ok(Theme {
            name: name.to_string(),
            manifest,
            path,
            assets_path: assets.is_dir().then_some(assets),
            is_active: !active_contexts.is_empty(),
            active_contexts,
            needs_upgrade,
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dirs.theme_path(name).join(TEMPLATE_FILE).is_file()
    }

    /// Theme configured for a context
    pub fn active_theme(&self, context: &str) -> ThemeResult<Theme> {
        let name = self
            .settings
            .theme_for_context(context)
            .ok_or_else(|| hostpanel_core::Error::InvalidInput(format!("Unknown context '{}'", context)))?;
        self.get(name)
    }

    pub fn supports_context(&self, name: &str, context: &str) -> ThemeResult<bool> {
        Ok(load_manifest(&self.dirs.theme_path(name))?.supports_context(context))
    }

    /// Locales with a `translations/messages.{locale}.yaml` file, sorted
    pub fn translation_locales(&self, name: &str) -> Vec<String> {
        let dir = self.dirs.theme_path(name).join("translations");
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut locales: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file = entry.file_name().to_string_lossy().into_owned();
                file.strip_prefix("messages.")
                    .and_then(|rest| rest.strip_suffix(".yaml"))
                    .filter(|locale| !locale.is_empty())
                    .map(str::to_string)
            })
            .collect();
        locales.sort();
        locales
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write, write_legacy_theme, write_theme};
    use tempfile::TempDir;

    fn settings(panel: &str, landing: &str, email: &str) -> ThemesConfig {
        ThemesConfig {
            panel: panel.to_string(),
            landing: landing.to_string(),
            email: email.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn lists_themes_with_activation_state() {
        let tmp = TempDir::new().unwrap();
        let dirs = ThemeDirs::under(tmp.path());
        write_theme(&dirs, "default");
        write_theme(&dirs, "aurora");
        write_legacy_theme(&dirs, "classic");
        write_legacy_theme(&dirs, "classic_backup");
        std::fs::create_dir_all(dirs.theme_path("broken")).unwrap();

        let catalog = ThemeCatalog::new(dirs.clone(), settings("aurora", "default", "aurora"));
        let themes = catalog.list().unwrap();
        let names: Vec<&str> = themes.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["aurora", "classic", "default"]);

        let aurora = &themes[0];
        assert!(aurora.is_active);
        assert_eq!(aurora.active_contexts, vec!["panel", "email"]);
        assert!(aurora.supports_dark_mode());
        assert!(!aurora.supports_custom_colors());
        assert!(aurora.assets_path.is_some());

        let classic = &themes[1];
        assert!(!classic.is_active);
        assert!(classic.needs_upgrade);
        assert!(classic.assets_path.is_none());
    }

    #[test]
    fn empty_when_themes_dir_is_missing() {
        let tmp = TempDir::new().unwrap();
        let catalog = ThemeCatalog::new(ThemeDirs::under(tmp.path()), ThemesConfig::default());
        assert!(catalog.list().unwrap().is_empty());
        assert!(matches!(catalog.get("aurora"), Err(ThemeError::NotFound(_))));
    }

    #[test]
    fn context_support_and_translations() {
        let tmp = TempDir::new().unwrap();
        let dirs = ThemeDirs::under(tmp.path());
        write_theme(&dirs, "aurora");
        write(&dirs.theme_path("aurora"), "translations/messages.en.yaml", b"hello: Hello");
        write(&dirs.theme_path("aurora"), "translations/messages.pl.yaml", b"hello: Czesc");
        write(&dirs.theme_path("aurora"), "translations/README.md", b"");

        let catalog = ThemeCatalog::new(dirs, settings("aurora", "aurora", "aurora"));
        assert!(catalog.supports_context("aurora", "landing").unwrap());
        assert!(!catalog.supports_context("aurora", "admin").unwrap());
        assert_eq!(catalog.translation_locales("aurora"), vec!["en", "pl"]);
        assert_eq!(catalog.active_theme("email").unwrap().name, "aurora");
    }
}
