//! Layout checks for an extracted theme archive
//!
//! An archive carries `themes/{name}/` and optionally
//! `public/assets/theme/{name}/`; nothing else may be shipped.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::manifest::{TemplateManifest, TEMPLATE_FILE};
use crate::{Severity, ThemeWarning, WarningKind};

pub const ASSETS_PREFIX: &str = "public/assets/theme";

/// First directory under `extracted/themes/` (by name) holding a `template.json`
pub fn find_theme_root(extracted: &Path) -> Option<PathBuf> {
    let themes = extracted.join("themes");
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&themes)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .find(|dir| dir.join(TEMPLATE_FILE).is_file())
}

/// Relative path with `/` separators regardless of platform
fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn validate_structure(extracted: &Path, manifest: &TemplateManifest) -> Vec<String> {
    let mut errors = Vec::new();
    let name = manifest.name();
    let theme_dir = extracted.join("themes").join(name);

    if !theme_dir.is_dir() {
        errors.push(format!("Theme directory themes/{}/ not found in ZIP", name));
    }
    if !theme_dir.join(TEMPLATE_FILE).is_file() {
        errors.push(format!("{} not found in theme directory", TEMPLATE_FILE));
    }
    for context in manifest.contexts() {
        if !theme_dir.join(context).is_dir() {
            errors.push(format!(
                "Context '{}' declared but directory themes/{}/{}/ not found",
                context, name, context
            ));
        }
    }

    let allowed = [
        format!("themes/{}/", name),
        format!("{}/{}/", ASSETS_PREFIX, name),
    ];
    for entry in WalkDir::new(extracted).min_depth(1) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let rel = relative(extracted, entry.path());
                if !allowed.iter().any(|prefix| rel.starts_with(prefix.as_str())) {
                    errors.push(format!("File outside allowed paths: {}", rel));
                }
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("Failed to validate directory structure: {}", e)),
        }
    }

    errors
}

pub fn check_assets(extracted: &Path, name: &str) -> Option<ThemeWarning> {
    let expected = format!("{}/{}/", ASSETS_PREFIX, name);
    (!extracted.join(ASSETS_PREFIX).join(name).is_dir()).then(|| {
        ThemeWarning::new(
            WarningKind::MissingAssets,
            Severity::Warning,
            "No assets directory found in ZIP. Theme may not display correctly.",
        )
        .with_detail("expected_path", expected)
    })
}

/// One warning per declared locale without `translations/messages.{locale}.yaml`
pub fn check_translations(theme_root: &Path, manifest: &TemplateManifest) -> Vec<ThemeWarning> {
    let dir = theme_root.join("translations");
    manifest
        .translations
        .iter()
        .filter(|locale| !dir.join(translation_file(locale)).is_file())
        .map(|locale| {
            ThemeWarning::new(
                WarningKind::MissingTranslation,
                Severity::Warning,
                format!("Translation declared but not found: {}", translation_file(locale)),
            )
            .with_detail("locale", locale)
        })
        .collect()
}

pub fn translation_file(locale: &str) -> String {
    format!("messages.{}.yaml", locale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn manifest(contexts: &[&str], translations: &[&str]) -> TemplateManifest {
        TemplateManifest::from_document(&json!({"template": {
            "name": "aurora",
            "contexts": contexts,
            "translations": translations,
        }}))
        .unwrap()
    }

    #[test]
    fn finds_first_theme_root_with_manifest() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("themes/aaa-empty")).unwrap();
        touch(tmp.path(), "themes/zeta/template.json");
        touch(tmp.path(), "themes/beta/template.json");

        assert_eq!(find_theme_root(tmp.path()), Some(tmp.path().join("themes/beta")));
        assert_eq!(find_theme_root(&tmp.path().join("nowhere")), None);
    }

    #[test]
    fn accepts_well_formed_layout() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "themes/aurora/template.json");
        touch(tmp.path(), "themes/aurora/panel/base.html.twig");
        touch(tmp.path(), "public/assets/theme/aurora/css/app.css");

        assert!(validate_structure(tmp.path(), &manifest(&["panel"], &[])).is_empty());
        assert!(check_assets(tmp.path(), "aurora").is_none());
    }

    #[test]
    fn reports_missing_contexts_and_stray_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "themes/aurora/template.json");
        touch(tmp.path(), "themes/aurora/panel/base.html.twig");
        touch(tmp.path(), "README.md");
        touch(tmp.path(), "public/assets/theme/other/app.js");

        let errors = validate_structure(tmp.path(), &manifest(&["panel", "email"], &[]));
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.contains(&"Context 'email' declared but directory themes/aurora/email/ not found".to_string()));
        assert!(errors.contains(&"File outside allowed paths: README.md".to_string()));
        assert!(errors.contains(&"File outside allowed paths: public/assets/theme/other/app.js".to_string()));
    }

    #[test]
    fn warns_about_missing_assets_and_translations() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "themes/aurora/template.json");
        touch(tmp.path(), "themes/aurora/translations/messages.en.yaml");

        let warning = check_assets(tmp.path(), "aurora").unwrap();
        assert_eq!(warning.kind, WarningKind::MissingAssets);
        assert_eq!(warning.details["expected_path"], "public/assets/theme/aurora/");

        let root = tmp.path().join("themes/aurora");
        let warnings = check_translations(&root, &manifest(&["panel"], &["en", "de"]));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].details["locale"], "de");
        assert!(warnings[0].message.ends_with("messages.de.yaml"));
    }
}
