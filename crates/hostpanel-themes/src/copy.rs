//! Duplicate an installed theme under a new name

use std::path::Path;
use std::sync::Arc;

use hostpanel_core::events::{EventPublisher, TracingEventPublisher};
use hostpanel_core::fs::Filesystem;
use regex::Regex;
use serde_json::json;
use uuid::Uuid;

use crate::events::ThemeEvent;

use crate::manifest::{parse_document, ROOT_KEY, TEMPLATE_FILE};
use crate::{ThemeDirs, ThemeError, ThemeResult};

const RESERVED_NAMES: [&str; 4] = ["default", "system", "admin", "test"];
const NAME_CHARS: &str = r"^[a-z0-9\-_]+$";
const MIN_NAME_LENGTH: usize = 3;
const MAX_NAME_LENGTH: usize = 50;

pub struct ThemeCopyService {
    dirs: ThemeDirs,
    fs: Arc<dyn Filesystem>,
    events: Arc<dyn EventPublisher>,
}

impl ThemeCopyService {
    pub fn new(dirs: ThemeDirs, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            dirs,
            fs,
            events: Arc::new(TracingEventPublisher),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Problems with `name` as the target of a copy, empty when it is usable
    pub fn validate_theme_name(&self, name: &str) -> Vec<String> {
        if name.is_empty() {
            return vec!["Theme name is required".to_string()];
        }

        let mut errors = Vec::new();
        let len = name.chars().count();
        if len < MIN_NAME_LENGTH {
            errors.push(format!("Theme name must be at least {} characters", MIN_NAME_LENGTH));
        }
        if len > MAX_NAME_LENGTH {
            errors.push(format!("Theme name must be at most {} characters", MAX_NAME_LENGTH));
        }
        match Regex::new(NAME_CHARS) {
            Ok(re) if !re.is_match(name) => errors.push(
                "Theme name may only contain lowercase letters, digits, hyphens and underscores".to_string(),
            ),
            Ok(_) => {}
            Err(e) => errors.push(format!("Theme name could not be checked: {}", e)),
        }
        if name.starts_with(['-', '_']) || name.ends_with(['-', '_']) {
            errors.push("Theme name cannot start or end with a hyphen or underscore".to_string());
        }
        if RESERVED_NAMES.contains(&name) {
            errors.push(format!("Theme name '{}' is reserved", name));
        }
        if self.fs.exists(&self.dirs.theme_path(name)) {
            errors.push(format!("Theme '{}' already exists", name));
        }
        errors
    }

    /// Mirror theme and assets to `target`, then rename the copy's manifest
    ///
    /// Both target directories are removed again if any step fails.
    pub fn copy_theme(&self, source: &str, target: &str) -> ThemeResult<()> {
        let operation_id = Uuid::new_v4();
        self.emit(ThemeEvent::copy_requested(operation_id, source, target));

        let result = self.try_copy(source, target);
        match &result {
            Ok(()) => self.emit(ThemeEvent::copied(operation_id, source, target)),
            Err(e) => self.emit(ThemeEvent::copy_failed(operation_id, source, target, &e.to_string())),
        }
        result
    }

    fn try_copy(&self, source: &str, target: &str) -> ThemeResult<()> {
        let source_path = self.dirs.theme_path(source);
        if !self.fs.exists(&source_path) {
            return Err(ThemeError::NotFound(source.to_string()));
        }
        let errors = self.validate_theme_name(target);
        if !errors.is_empty() {
            return Err(ThemeError::InvalidName {
                name: target.to_string(),
                errors,
            });
        }

        let target_path = self.dirs.theme_path(target);
        let target_assets = self.dirs.assets_path(target);
        let result = self.mirror_and_rename(source, target, &target_path, &target_assets);
        if let Err(e) = &result {
            tracing::error!(source, target, error = %e, "Theme copy failed");
            for path in [&target_path, &target_assets] {
                if let Err(cleanup) = self.fs.remove(path) {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial theme copy");
                }
            }
        } else {
            tracing::info!(source, target, "Theme copied");
        }
        result
    }

    fn emit(&self, event: ThemeEvent) {
        if let Err(e) = self.events.publish(&event) {
            tracing::warn!(event = %event.event_type, theme = %event.subject, error = %e, "Failed to publish theme event");
        }
    }

    fn mirror_and_rename(&self, source: &str, target: &str, target_path: &Path, target_assets: &Path) -> ThemeResult<()> {
        self.fs.mirror(&self.dirs.theme_path(source), target_path)?;

        let source_assets = self.dirs.assets_path(source);
        if self.fs.exists(&source_assets) {
            self.fs.mirror(&source_assets, target_assets)?;
        }

        let manifest_path = target_path.join(TEMPLATE_FILE);
        if self.fs.exists(&manifest_path) {
            let mut document = parse_document(&self.fs.read_to_string(&manifest_path)?)?;
            if let Some(template) = document.get_mut(ROOT_KEY).and_then(serde_json::Value::as_object_mut) {
                template.insert("name".to_string(), json!(target));
            }
            let bytes = serde_json::to_vec_pretty(&document).map_err(hostpanel_core::Error::from)?;
            self.fs.dump_file(&manifest_path, &bytes)?;
        }
        Ok(())
    }
}
