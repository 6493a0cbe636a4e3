use std::path::PathBuf;
use std::sync::Arc;

use hostpanel_core::fs::{DIR_MODE, FILE_MODE, Filesystem};

use crate::PluginResult;
use crate::entity::Plugin;
use crate::ports::AssetPublisher;

/// Directory inside a plugin holding its public assets
pub const ASSETS_DIR: &str = "assets";

/// Mirrors `{plugin}/assets` to `{public}/{plugin name}`
pub struct FsAssetPublisher {
    public_dir: PathBuf,
    fs: Arc<dyn Filesystem>,
}

impl FsAssetPublisher {
    pub fn new(public_dir: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            public_dir: public_dir.into(),
            fs,
        }
    }

    pub fn target_for(&self, plugin_name: &str) -> PathBuf {
        self.public_dir.join(plugin_name)
    }

    fn source_for(plugin: &Plugin) -> PathBuf {
        plugin.path.join(ASSETS_DIR)
    }
}

impl AssetPublisher for FsAssetPublisher {
    fn publish(&self, plugin: &Plugin) -> PluginResult<bool> {
        let source = Self::source_for(plugin);
        if !self.fs.exists(&source) {
            return Ok(false);
        }

        let target = self.target_for(&plugin.name);
        self.fs.remove(&target)?;
        self.fs.mirror(&source, &target)?;
        self.fs.set_permissions(&target, DIR_MODE, FILE_MODE)?;
        tracing::debug!(plugin = %plugin.name, target = %target.display(), "Published plugin assets");
        Ok(true)
    }

    fn unpublish(&self, plugin: &Plugin) -> PluginResult<()> {
        let target = self.target_for(&plugin.name);
        self.fs.remove(&target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::plugin_at;
    use hostpanel_core::fs::LocalFilesystem;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn publish_and_unpublish() {
        let tmp = TempDir::new().unwrap();
        let plugin = plugin_at(&tmp.path().join("plugins"), "tickets");
        fs::create_dir_all(plugin.path.join("assets/css")).unwrap();
        fs::write(plugin.path.join("assets/css/app.css"), "body{}").unwrap();

        let public = tmp.path().join("public/plugins");
        let publisher = FsAssetPublisher::new(&public, Arc::new(LocalFilesystem::new()));

        assert!(publisher.publish(&plugin).unwrap());
        assert!(public.join("tickets/css/app.css").is_file());

        publisher.unpublish(&plugin).unwrap();
        assert!(!public.join("tickets").exists());
    }

    #[test]
    fn nothing_to_publish() {
        let tmp = TempDir::new().unwrap();
        let plugin = plugin_at(tmp.path(), "tickets");

        let publisher = FsAssetPublisher::new(tmp.path().join("public"), Arc::new(LocalFilesystem::new()));
        assert!(!publisher.publish(&plugin).unwrap());
    }
}
