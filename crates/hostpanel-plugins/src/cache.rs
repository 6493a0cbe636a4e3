//! Enabled-plugins cache and the post-commit refresh signal
//!
//! Lifecycle operations never touch caches themselves. They return a
//! [`PostCommit`] which the caller applies once the change is known to be
//! persisted: compiled cache entries are cleared and the enabled-plugins
//! file read by the runtime bootstrap is rebuilt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostpanel_core::fs::Filesystem;

use crate::PluginResult;
use crate::ports::PluginRepository;

pub const ENABLED_PLUGINS_FILE: &str = "enabled_plugins.json";
const KEEP_FILES: &[&str] = &[".gitkeep", ENABLED_PLUGINS_FILE];

/// What the runtime bootstrap needs to know about an enabled plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPlugin {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    generated_at: DateTime<Utc>,
    plugins: Vec<CachedPlugin>,
}

pub struct EnabledPluginsCache {
    cache_dir: PathBuf,
    fs: Arc<dyn Filesystem>,
}

impl EnabledPluginsCache {
    pub fn new(cache_dir: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fs,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(ENABLED_PLUGINS_FILE)
    }

    /// Remove compiled cache entries, keeping the enabled-plugins file
    pub fn clear_compiled(&self) -> PluginResult<usize> {
        if !self.cache_dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if KEEP_FILES.contains(&name.as_str()) {
                continue;
            }
            self.fs.remove(&entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Rewrite the enabled-plugins file from the repository
    pub fn rebuild(&self, repository: &dyn PluginRepository) -> PluginResult<usize> {
        let plugins: Vec<CachedPlugin> = repository
            .find_enabled()?
            .into_iter()
            .map(|p| CachedPlugin {
                name: p.name,
                version: p.version,
                path: p.path,
                capabilities: p.capabilities,
            })
            .collect();
        let count = plugins.len();

        let file = CacheFile {
            generated_at: Utc::now(),
            plugins,
        };
        let json = serde_json::to_vec_pretty(&file).map_err(hostpanel_core::Error::from)?;
        self.fs.dump_file(&self.path(), &json)?;
        Ok(count)
    }

    /// Enabled plugins as last written. A missing cache reads as empty.
    pub fn read(&self) -> PluginResult<Vec<CachedPlugin>> {
        let path = self.path();
        if !self.fs.exists(&path) {
            return Ok(Vec::new());
        }
        let data = self.fs.read_to_string(&path)?;
        let file: CacheFile = serde_json::from_str(&data).map_err(hostpanel_core::Error::from)?;
        Ok(file.plugins)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Signal returned by committed lifecycle operations
#[must_use = "apply the post-commit step after the change is persisted"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCommit {
    operation: &'static str,
    plugins: Vec<String>,
}

/// Result of applying a [`PostCommit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRefresh {
    pub cleared_entries: usize,
    pub enabled_plugins: usize,
}

impl PostCommit {
    pub(crate) fn new(operation: &'static str, plugins: Vec<String>) -> Self {
        Self { operation, plugins }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Plugins whose state changed, in the order they changed
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Clear compiled caches and rebuild the enabled-plugins file
    pub fn apply(
        self,
        cache: &EnabledPluginsCache,
        repository: &dyn PluginRepository,
    ) -> PluginResult<CacheRefresh> {
        let cleared_entries = cache.clear_compiled()?;
        let enabled_plugins = cache.rebuild(repository)?;
        tracing::info!(
            operation = self.operation,
            plugins = ?self.plugins,
            cleared_entries,
            enabled_plugins,
            "Plugin cache refreshed"
        );
        Ok(CacheRefresh {
            cleared_entries,
            enabled_plugins,
        })
    }
}
