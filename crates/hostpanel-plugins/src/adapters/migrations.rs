use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::jsonl::JsonlFile;
use crate::PluginResult;
use crate::entity::Plugin;
use crate::ports::MigrationRunner;

pub const MIGRATIONS_FILE: &str = "plugin_migrations.jsonl";
/// Directory inside a plugin holding ordered `*.sql` migration scripts
pub const MIGRATIONS_DIR: &str = "migrations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub plugin: String,
    pub migration: String,
    pub applied_at: DateTime<Utc>,
}

/// Tracks which migration scripts of each plugin have been applied
///
/// Scripts are discovered from `{plugin}/migrations/*.sql` and applied in
/// file-name order; the schema change itself belongs to the host database.
pub struct MigrationLedger {
    file: JsonlFile<AppliedMigration>,
    write_lock: Mutex<()>,
}

impl MigrationLedger {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file: JsonlFile::new(data_dir.join(MIGRATIONS_FILE)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn applied_for(&self, plugin_name: &str) -> PluginResult<Vec<AppliedMigration>> {
        Ok(self
            .file
            .read_all()?
            .into_iter()
            .filter(|m| m.plugin == plugin_name)
            .collect())
    }

    /// Migration scripts shipped by a plugin, sorted by file name
    pub fn available(plugin_dir: &Path) -> PluginResult<Vec<String>> {
        let dir = plugin_dir.join(MIGRATIONS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && path.extension().is_some_and(|e| e == "sql") {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl MigrationRunner for MigrationLedger {
    fn run_pending(&self, plugin: &Plugin) -> PluginResult<Vec<String>> {
        let available = Self::available(&plugin.path)?;
        if available.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ledger = self.file.read_all()?;
        let pending: Vec<String> = available
            .into_iter()
            .filter(|name| {
                !ledger
                    .iter()
                    .any(|m| m.plugin == plugin.name && &m.migration == name)
            })
            .collect();

        for name in &pending {
            tracing::info!(plugin = %plugin.name, migration = %name, "Applying plugin migration");
            ledger.push(AppliedMigration {
                plugin: plugin.name.clone(),
                migration: name.clone(),
                applied_at: Utc::now(),
            });
        }
        if !pending.is_empty() {
            self.file.write_all(&ledger)?;
        }
        Ok(pending)
    }
}
