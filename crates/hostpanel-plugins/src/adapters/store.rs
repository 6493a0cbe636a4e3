use std::path::Path;
use std::sync::{Mutex, PoisonError};

use hostpanel_core::Result;

use super::jsonl::JsonlFile;
use crate::entity::{Plugin, PluginState};
use crate::ports::PluginRepository;

pub const PLUGINS_FILE: &str = "plugins.jsonl";

/// Plugin records stored as `plugins.jsonl` in the data directory
pub struct JsonlPluginRepository {
    file: JsonlFile<Plugin>,
    write_lock: Mutex<()>,
}

impl JsonlPluginRepository {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file: JsonlFile::new(data_dir.join(PLUGINS_FILE)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl PluginRepository for JsonlPluginRepository {
    fn find_by_name(&self, name: &str) -> Result<Option<Plugin>> {
        Ok(self.file.read_all()?.into_iter().find(|p| p.name == name))
    }

    fn find_all(&self) -> Result<Vec<Plugin>> {
        let mut plugins = self.file.read_all()?;
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plugins)
    }

    fn find_by_state(&self, state: PluginState) -> Result<Vec<Plugin>> {
        Ok(self
            .find_all()?
            .into_iter()
            .filter(|p| p.state() == state)
            .collect())
    }

    fn count_by_state(&self, state: PluginState) -> Result<usize> {
        Ok(self.find_by_state(state)?.len())
    }

    fn save(&self, plugin: &Plugin) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut plugins = self.file.read_all()?;
        match plugins.iter_mut().find(|p| p.name == plugin.name) {
            Some(existing) => *existing = plugin.clone(),
            None => plugins.push(plugin.clone()),
        }
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        self.file.write_all(&plugins)
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut plugins = self.file.read_all()?;
        let before = plugins.len();
        plugins.retain(|p| p.name != name);
        if plugins.len() == before {
            return Ok(false);
        }
        self.file.write_all(&plugins)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::plugin_with;
    use tempfile::TempDir;

    #[test]
    fn save_replaces_by_name_and_persists() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonlPluginRepository::new(tmp.path());

        let mut tickets = plugin_with("tickets", "1.0.0", &[]);
        repo.save(&plugin_with("reports", "1.0.0", &[])).unwrap();
        repo.save(&tickets).unwrap();
        tickets.version = "1.1.0".to_string();
        repo.save(&tickets).unwrap();

        let reopened = JsonlPluginRepository::new(tmp.path());
        let all = reopened.find_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "reports");
        assert_eq!(reopened.find_by_name("tickets").unwrap().unwrap().version, "1.1.0");
        assert_eq!(reopened.count_by_state(PluginState::Registered).unwrap(), 2);
        assert_eq!(reopened.count().unwrap(), 2);
    }

    #[test]
    fn remove_reports_whether_anything_was_deleted() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonlPluginRepository::new(tmp.path());
        repo.save(&plugin_with("tickets", "1.0.0", &[])).unwrap();

        assert!(repo.remove("tickets").unwrap());
        assert!(!repo.remove("tickets").unwrap());
        assert!(!repo.exists("tickets").unwrap());
    }
}
