//! Theme upload pipeline
//!
//! One call takes an uploaded ZIP from validation to installed theme:
//!
//! 1. file checks (type, size, extension, readable archive)
//! 2. archive inspection, then extraction into `var/tmp/theme-upload-{uuid}`
//! 3. manifest lookup, parse and validation
//! 4. layout validation and name conflict check
//! 5. warning collection (host version, assets, security scan, translations)
//! 6. move into `themes/` and `public/assets/theme/`, then permissions
//!
//! Any failure removes the temp dir and whatever was already moved into place.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostpanel_core::events::{EventPublisher, TracingEventPublisher};
use hostpanel_core::fs::{Filesystem, DIR_MODE, FILE_MODE};
use uuid::Uuid;

use crate::archive::{validate_upload, ThemeArchive, UploadLimits};
use crate::events::ThemeEvent;
use crate::manifest::{load_manifest, TemplateManifest, TEMPLATE_FILE};
use crate::security::ThemeSecurityValidator;
use crate::structure::{check_assets, check_translations, find_theme_root, validate_structure, ASSETS_PREFIX};
use crate::validator::TemplateManifestValidator;
use crate::{ThemeDirs, ThemeError, ThemeResult, ThemeWarning};

/// Outcome of an upload that did not fail
///
/// `success == false` means the theme was not installed because warnings
/// need confirmation; repeat the upload with `ignore_warnings`.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeUploadResult {
    pub success: bool,
    pub manifest: TemplateManifest,
    pub theme_path: Option<PathBuf>,
    pub assets_path: Option<PathBuf>,
    pub warnings: Vec<ThemeWarning>,
}

impl ThemeUploadResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Paths this upload has created so far
#[derive(Debug, Default)]
struct Created {
    temp: Option<PathBuf>,
    theme: Option<PathBuf>,
    assets: Option<PathBuf>,
}

pub struct ThemeUploadService {
    dirs: ThemeDirs,
    limits: UploadLimits,
    validator: TemplateManifestValidator,
    security: ThemeSecurityValidator,
    fs: Arc<dyn Filesystem>,
    events: Arc<dyn EventPublisher>,
}

impl ThemeUploadService {
    pub fn new(dirs: ThemeDirs, validator: TemplateManifestValidator, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            dirs,
            limits: UploadLimits::default(),
            validator,
            security: ThemeSecurityValidator::new(),
            fs,
            events: Arc::new(TracingEventPublisher),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    pub fn upload(&self, archive_path: &Path, ignore_warnings: bool) -> ThemeResult<ThemeUploadResult> {
        tracing::info!(file = %archive_path.display(), ignore_warnings, "Starting theme upload");
        let operation_id = Uuid::new_v4();
        let file = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.emit(ThemeEvent::upload_requested(operation_id, &file, ignore_warnings));

        let mut created = Created::default();
        match self.run(archive_path, ignore_warnings, &mut created) {
            Ok(result) => {
                if let Some(temp) = &created.temp {
                    self.discard(temp);
                }
                if result.success {
                    self.emit(ThemeEvent::uploaded(operation_id, &result.manifest, result.warnings.len()));
                }
                Ok(result)
            }
            Err(e) => {
                tracing::error!(file = %archive_path.display(), error = %e, "Theme upload failed");
                self.rollback(&created);
                self.emit(ThemeEvent::upload_failed(operation_id, &file, e.code(), &e.to_string()));
                Err(e)
            }
        }
    }

    fn run(
        &self,
        archive_path: &Path,
        ignore_warnings: bool,
        created: &mut Created,
    ) -> ThemeResult<ThemeUploadResult> {
        validate_upload(archive_path, &self.limits)?;

        let mut archive = ThemeArchive::open(archive_path)?;
        let summary = archive.inspect(self.limits.max_extracted_bytes)?;
        tracing::debug!(entries = summary.entries, bytes = summary.total_size, "Archive passed inspection");

        let temp = self
            .dirs
            .temp_dir
            .join(format!("theme-upload-{}", Uuid::new_v4().simple()));
        self.fs.mkdir(&temp)?;
        created.temp = Some(temp.clone());
        archive.extract_to(&temp, self.limits.max_extracted_bytes)?;

        let theme_root = find_theme_root(&temp).ok_or_else(|| ThemeError::InvalidStructure {
            message: format!("Could not find themes/{{name}}/{} in ZIP", TEMPLATE_FILE),
            errors: Vec::new(),
        })?;
        let manifest = load_manifest(&theme_root)?;

        let errors = self.validator.validate(&manifest);
        if !errors.is_empty() {
            return Err(ThemeError::InvalidManifest {
                message: format!("Invalid {}", TEMPLATE_FILE),
                errors,
            });
        }

        let errors = validate_structure(&temp, &manifest);
        if !errors.is_empty() {
            return Err(ThemeError::InvalidStructure {
                message: "Invalid theme structure".to_string(),
                errors,
            });
        }

        let name = manifest.name().to_string();
        self.check_conflict(&name)?;

        let warnings = self.collect_warnings(&temp, &manifest);
        let critical: Vec<ThemeWarning> = warnings.iter().filter(|w| w.is_critical()).cloned().collect();
        if !critical.is_empty() {
            return Err(ThemeError::Security { warnings: critical });
        }
        if !warnings.is_empty() && !ignore_warnings {
            tracing::info!(theme = %name, warnings = warnings.len(), "Theme upload needs confirmation");
            return Ok(ThemeUploadResult {
                success: false,
                manifest,
                theme_path: None,
                assets_path: None,
                warnings,
            });
        }

        let theme_path = self.dirs.theme_path(&name);
        self.fs.rename(&temp.join("themes").join(&name), &theme_path)?;
        created.theme = Some(theme_path.clone());

        let source_assets = temp.join(ASSETS_PREFIX).join(&name);
        let assets_path = if source_assets.is_dir() {
            let target = self.dirs.assets_path(&name);
            self.fs.rename(&source_assets, &target)?;
            created.assets = Some(target.clone());
            Some(target)
        } else {
            None
        };

        self.apply_permissions(&theme_path);
        if let Some(assets) = &assets_path {
            self.apply_permissions(assets);
        }

        tracing::info!(
            theme = %name,
            version = %manifest.version(),
            theme_path = %theme_path.display(),
            warnings = warnings.len(),
            "Theme uploaded successfully"
        );

        Ok(ThemeUploadResult {
            success: true,
            manifest,
            theme_path: Some(theme_path),
            assets_path,
            warnings,
        })
    }

    fn check_conflict(&self, name: &str) -> ThemeResult<()> {
        if self.fs.exists(&self.dirs.theme_path(name)) || self.fs.exists(&self.dirs.assets_path(name)) {
            return Err(ThemeError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn collect_warnings(&self, extracted: &Path, manifest: &TemplateManifest) -> Vec<ThemeWarning> {
        let name = manifest.name();
        let theme_root = extracted.join("themes").join(name);
        let assets_root = extracted.join(ASSETS_PREFIX).join(name);

        let mut warnings: Vec<ThemeWarning> = self.validator.outdated_warning(manifest).into_iter().collect();
        warnings.extend(check_assets(extracted, name));
        warnings.extend(self.security.scan_theme(&theme_root));
        if assets_root.is_dir() {
            warnings.extend(self.security.scan_assets(&assets_root));
        }
        warnings.extend(check_translations(&theme_root, manifest));
        warnings
    }

    fn emit(&self, event: ThemeEvent) {
        if let Err(e) = self.events.publish(&event) {
            tracing::warn!(event = %event.event_type, theme = %event.subject, error = %e, "Failed to publish theme event");
        }
    }

    fn apply_permissions(&self, path: &Path) {
        if let Err(e) = self.fs.set_permissions(path, DIR_MODE, FILE_MODE) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to set permissions");
        }
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = self.fs.remove(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to clean up after theme upload");
        }
    }

    /// Temp dir first, then the installed theme, then its assets
    fn rollback(&self, created: &Created) {
        for path in [&created.temp, &created.theme, &created.assets].into_iter().flatten() {
            self.discard(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_zip, host_version, local_fs, theme_entries, ZipEntry};
    use crate::{Severity, WarningKind};
    use hostpanel_core::events::InMemoryEventStore;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        dirs: ThemeDirs,
        service: ThemeUploadService,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let dirs = ThemeDirs::under(tmp.path());
            let service = ThemeUploadService::new(
                dirs.clone(),
                TemplateManifestValidator::new(host_version()),
                local_fs(),
            );
            Self { tmp, dirs, service }
        }

        fn archive(&self, entries: Vec<ZipEntry>) -> PathBuf {
            let path = self.tmp.path().join("upload.zip");
            build_zip(&path, &entries);
            path
        }

        fn temp_is_empty(&self) -> bool {
            fs::read_dir(&self.dirs.temp_dir).map_or(true, |mut entries| entries.next().is_none())
        }
    }

    #[test]
    fn installs_clean_theme() {
        let fx = Fixture::new();
        let zip = fx.archive(theme_entries("aurora"));

        let result = fx.service.upload(&zip, false).unwrap();
        assert!(result.success, "{:?}", result.warnings);
        assert!(!result.has_warnings());
        assert_eq!(result.theme_path, Some(fx.dirs.theme_path("aurora")));
        assert!(fx.dirs.theme_path("aurora").join("panel/base.html.twig").is_file());
        assert!(fx.dirs.assets_path("aurora").join("css/app.css").is_file());
        assert!(fx.temp_is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn installed_files_get_standard_modes() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        fx.service.upload(&fx.archive(theme_entries("aurora")), false).unwrap();

        let mode = |p: PathBuf| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(fx.dirs.theme_path("aurora").join("panel")), 0o755);
        assert_eq!(mode(fx.dirs.theme_path("aurora").join("template.json")), 0o644);
    }

    #[test]
    fn zip_bomb_creates_nothing_under_temp() {
        let fx = Fixture::new();
        let mut entries = theme_entries("aurora");
        entries.push(ZipEntry::file("themes/aurora/panel/huge.html.twig", &vec![b'a'; 64 * 1024]));
        let zip = fx.archive(entries);

        let service = ThemeUploadService::new(
            fx.dirs.clone(),
            TemplateManifestValidator::new(host_version()),
            local_fs(),
        )
        .with_limits(UploadLimits {
            max_upload_bytes: 1024 * 1024,
            max_extracted_bytes: 16 * 1024,
        });

        let err = service.upload(&zip, true).unwrap_err();
        assert!(matches!(err, ThemeError::ZipBomb { .. }), "{err}");
        assert!(fx.temp_is_empty());
        assert!(!fx.dirs.theme_path("aurora").exists());
    }

    #[test]
    fn traversal_entry_is_rejected_before_extraction() {
        let fx = Fixture::new();
        let mut entries = theme_entries("aurora");
        entries.push(ZipEntry::file("../../etc/password", b"root:x:0:0"));
        let zip = fx.archive(entries);

        let err = fx.service.upload(&zip, true).unwrap_err();
        assert!(matches!(err, ThemeError::MaliciousPath(ref p) if p == "../../etc/password"));
        assert!(fx.temp_is_empty());
    }

    #[test]
    fn warnings_need_confirmation() {
        let fx = Fixture::new();
        let mut entries = theme_entries("aurora");
        entries.push(ZipEntry::file(
            "themes/aurora/panel/page.html.twig",
            b"<div>{{ description|raw }}</div>",
        ));
        let zip = fx.archive(entries);

        let result = fx.service.upload(&zip, false).unwrap();
        assert!(!result.success);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::RawFilter);
        assert!(result.theme_path.is_none());
        assert!(!fx.dirs.theme_path("aurora").exists());
        assert!(fx.temp_is_empty());

        let result = fx.service.upload(&zip, true).unwrap();
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(fx.dirs.theme_path("aurora").join("panel/page.html.twig").is_file());
    }

    #[test]
    fn critical_findings_always_fail() {
        let fx = Fixture::new();
        let mut entries = theme_entries("aurora");
        entries.push(ZipEntry::file("themes/aurora/panel/backdoor.php", b"<?php eval($_POST['x']);"));
        entries.push(ZipEntry::file("public/assets/theme/aurora/js/setup.sh", b"#!/bin/sh"));
        let zip = fx.archive(entries);

        for ignore in [false, true] {
            let err = fx.service.upload(&zip, ignore).unwrap_err();
            match err {
                ThemeError::Security { warnings } => {
                    assert_eq!(warnings.len(), 2);
                    assert!(warnings.iter().all(|w| w.severity == Severity::Critical));
                }
                other => panic!("expected security error, got {other}"),
            }
            assert!(!fx.dirs.theme_path("aurora").exists());
            assert!(!fx.dirs.assets_path("aurora").exists());
            assert!(fx.temp_is_empty());
        }
    }

    #[test]
    fn existing_theme_is_a_conflict() {
        let fx = Fixture::new();
        let zip = fx.archive(theme_entries("aurora"));
        fx.service.upload(&zip, false).unwrap();

        let err = fx.service.upload(&zip, false).unwrap_err();
        assert!(matches!(err, ThemeError::AlreadyExists(ref n) if n == "aurora"));
        assert!(err.to_string().contains("Delete it first"));
        // the first install is untouched
        assert!(fx.dirs.theme_path("aurora").join("template.json").is_file());
    }

    #[test]
    fn upload_attempts_are_recorded_as_events() {
        let fx = Fixture::new();
        let events = Arc::new(InMemoryEventStore::new());
        let service = ThemeUploadService::new(
            fx.dirs.clone(),
            TemplateManifestValidator::new(host_version()),
            local_fs(),
        )
        .with_events(events.clone());
        let zip = fx.archive(theme_entries("aurora"));

        service.upload(&zip, false).unwrap();
        let _ = service.upload(&zip, false).unwrap_err();

        let all = events.all_events();
        let types: Vec<&str> = all.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            ["theme.upload_requested", "theme.uploaded", "theme.upload_requested", "theme.upload_failed"]
        );
        assert_eq!(all[0].aggregate_name, "upload.zip");
        assert_eq!(all[1].aggregate_name, "aurora");
        assert_eq!(all[0].aggregate_id, all[1].aggregate_id);
        assert_eq!(all[3].data.as_ref().unwrap()["code"], "E710");
    }

    #[test]
    fn invalid_manifest_lists_every_error() {
        let fx = Fixture::new();
        let document = serde_json::json!({"template": {"name": "aurora", "contexts": ["panel"]}});
        let zip = fx.archive(vec![
            ZipEntry::file("themes/aurora/template.json", document.to_string().as_bytes()),
            ZipEntry::file("themes/aurora/panel/base.html.twig", b""),
        ]);

        match fx.service.upload(&zip, true).unwrap_err() {
            ThemeError::InvalidManifest { errors, .. } => assert_eq!(errors.len(), 5),
            other => panic!("expected manifest error, got {other}"),
        }
        assert!(fx.temp_is_empty());
    }

    #[test]
    fn stray_files_are_a_structure_error() {
        let fx = Fixture::new();
        let mut entries = theme_entries("aurora");
        entries.push(ZipEntry::file("install.txt", b"read me"));
        let zip = fx.archive(entries);

        match fx.service.upload(&zip, true).unwrap_err() {
            ThemeError::InvalidStructure { errors, .. } => {
                assert_eq!(errors, vec!["File outside allowed paths: install.txt".to_string()])
            }
            other => panic!("expected structure error, got {other}"),
        }
    }

    #[test]
    fn archive_without_theme_root_is_rejected() {
        let fx = Fixture::new();
        let zip = fx.archive(vec![ZipEntry::file("template.json", b"{}")]);

        let err = fx.service.upload(&zip, true).unwrap_err();
        assert_eq!(err.code(), "E709");
        assert!(fx.temp_is_empty());
    }
}
