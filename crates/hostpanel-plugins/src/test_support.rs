//! Builders and fakes shared by unit tests

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hostpanel_core::events::InMemoryEventStore;
use hostpanel_core::fs::{Filesystem, LocalFilesystem};
use semver::Version;
use serde_json::json;
use tempfile::TempDir;

use crate::adapters::{InMemoryPluginRepository, InMemorySettingsStore};
use crate::entity::{Plugin, PluginState};
use crate::manager::{PluginManager, PluginServices};
use crate::manifest::PluginManifest;
use crate::packages::{InstallOutput, PackageInstaller};
use crate::ports::{AssetPublisher, MigrationRunner, RuntimeLoader};
use crate::scanner::PluginScanner;
use crate::security::{IssueSeverity, SecurityIssue, SecurityReport, SecurityScanner};
use crate::validator::PluginManifestValidator;
use crate::{PluginError, PluginResult};

pub const HOST_VERSION: &str = "1.4.0";

fn manifest_json(name: &str, version: &str, requires: &[(&str, &str)]) -> serde_json::Value {
    let requires: serde_json::Map<String, serde_json::Value> = requires
        .iter()
        .map(|(dep, constraint)| (dep.to_string(), json!(constraint)))
        .collect();
    json!({
        "name": name,
        "display_name": name.to_uppercase(),
        "version": version,
        "author": "Hostpanel Team",
        "description": format!("The {} plugin", name),
        "license": "MIT",
        "requires": requires,
        "config_schema": [{"key": "enabled_widgets", "type": "integer", "default": 3}],
    })
}

/// A registered plugin that lives nowhere on disk
pub fn plugin_with(name: &str, version: &str, requires: &[(&str, &str)]) -> Plugin {
    plugin_in(name, version, requires, PluginState::Registered)
}

pub fn plugin_in(name: &str, version: &str, requires: &[(&str, &str)], state: PluginState) -> Plugin {
    let raw = manifest_json(name, version, requires);
    let mut manifest: PluginManifest = serde_json::from_value(raw.clone()).unwrap();
    manifest.raw = raw;
    let mut plugin = Plugin::from_manifest(format!("/srv/plugins/{}", name), &manifest);
    let reason = (state == PluginState::Faulted).then(|| "broken in a test".to_string());
    plugin.set_state(state, reason);
    plugin
}

/// Write `root/name/plugin.json` and return the plugin directory
pub fn write_plugin(root: &Path, name: &str, version: &str, requires: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let manifest = manifest_json(name, version, requires);
    fs::write(
        dir.join("plugin.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    dir
}

/// A registered plugin backed by a real directory under `root`
pub fn plugin_at(root: &Path, name: &str) -> Plugin {
    let dir = write_plugin(root, name, "1.0.0", &[]);
    let mut plugin = Plugin::from_manifest(&dir, &crate::manifest::load_manifest(&dir).unwrap());
    plugin.set_state(PluginState::Registered, None);
    plugin
}

/// Ordered log of side-effect calls made by the fakes below
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    fn record(&self, call: String) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }
}

/// Loader, asset publisher and migration runner in one fake
#[derive(Default)]
pub struct RecordingRuntime {
    pub log: CallLog,
    fail_load: Mutex<Option<String>>,
}

impl RecordingRuntime {
    pub fn fail_load(&self, message: &str) {
        *self.fail_load.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }
}

impl RuntimeLoader for RecordingRuntime {
    fn load(&self, plugin: &Plugin) -> PluginResult<()> {
        if let Some(message) = self.fail_load.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(PluginError::runtime(&plugin.name, message));
        }
        self.log.record(format!("load:{}", plugin.name));
        Ok(())
    }

    fn unload(&self, plugin: &Plugin) -> PluginResult<()> {
        self.log.record(format!("unload:{}", plugin.name));
        Ok(())
    }
}

impl AssetPublisher for RecordingRuntime {
    fn publish(&self, plugin: &Plugin) -> PluginResult<bool> {
        self.log.record(format!("publish:{}", plugin.name));
        Ok(true)
    }

    fn unpublish(&self, plugin: &Plugin) -> PluginResult<()> {
        self.log.record(format!("unpublish:{}", plugin.name));
        Ok(())
    }
}

impl MigrationRunner for RecordingRuntime {
    fn run_pending(&self, plugin: &Plugin) -> PluginResult<Vec<String>> {
        self.log.record(format!("migrate:{}", plugin.name));
        Ok(vec!["001_init.sql".to_string()])
    }
}

/// Package installer driven by files in the plugin directory
///
/// A plugin "requires packages" when it has `composer.json`; installing
/// fails when `fail_install` is set.
#[derive(Default)]
pub struct FakeInstaller {
    pub installs: CallLog,
    fail_install: Mutex<bool>,
}

impl FakeInstaller {
    pub fn fail_install(&self) {
        *self.fail_install.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }
}

impl PackageInstaller for FakeInstaller {
    fn requires_dependencies(&self, plugin: &Plugin) -> PluginResult<bool> {
        Ok(plugin.path.join("composer.json").is_file())
    }

    fn has_lock_file(&self, plugin: &Plugin) -> bool {
        plugin.path.join("composer.lock").is_file()
    }

    fn is_installed(&self, plugin: &Plugin) -> bool {
        plugin.path.join("vendor").is_dir()
    }

    fn install(&self, plugin: &Plugin, clean: bool) -> PluginResult<InstallOutput> {
        if *self.fail_install.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(PluginError::PackageInstall {
                plugin: plugin.name.clone(),
                output: "Your requirements could not be resolved".to_string(),
            });
        }
        self.installs.record(format!("install:{}:{}", plugin.name, clean));
        fs::create_dir_all(plugin.path.join("vendor"))?;
        Ok(InstallOutput {
            stdout: "Generating optimized autoload files".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(5),
        })
    }
}

/// Scanner returning a canned report for named plugins
#[derive(Default)]
pub struct FakeSecurity {
    findings: Mutex<Vec<(String, SecurityIssue)>>,
}

impl FakeSecurity {
    pub fn flag(&self, plugin: &str, severity: IssueSeverity, message: &str) {
        self.findings.lock().unwrap_or_else(PoisonError::into_inner).push((
            plugin.to_string(),
            SecurityIssue {
                severity,
                file: "src/Plugin.php".to_string(),
                message: message.to_string(),
            },
        ));
    }
}

impl SecurityScanner for FakeSecurity {
    fn scan(&self, plugin: &Plugin) -> PluginResult<SecurityReport> {
        let issues = self
            .findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(name, _)| *name == plugin.name)
            .map(|(_, issue)| issue.clone())
            .collect();
        Ok(SecurityReport { issues })
    }
}

/// Local disk, except that recursive removal always fails
#[derive(Debug, Default)]
pub struct UndeletableFs(LocalFilesystem);

impl Filesystem for UndeletableFs {
    fn exists(&self, path: &Path) -> bool {
        self.0.exists(path)
    }

    fn mkdir(&self, path: &Path) -> hostpanel_core::Result<()> {
        self.0.mkdir(path)
    }

    fn mirror(&self, from: &Path, to: &Path) -> hostpanel_core::Result<()> {
        self.0.mirror(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> hostpanel_core::Result<()> {
        self.0.rename(from, to)
    }

    fn remove(&self, path: &Path) -> hostpanel_core::Result<()> {
        Err(hostpanel_core::Error::filesystem(
            "remove",
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        ))
    }

    fn dump_file(&self, path: &Path, contents: &[u8]) -> hostpanel_core::Result<()> {
        self.0.dump_file(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> hostpanel_core::Result<String> {
        self.0.read_to_string(path)
    }

    fn set_permissions(&self, path: &Path, dir_mode: u32, file_mode: u32) -> hostpanel_core::Result<()> {
        self.0.set_permissions(path, dir_mode, file_mode)
    }
}

/// A manager over in-memory ports and a temporary plugins directory
pub struct Harness {
    pub tmp: TempDir,
    pub repository: Arc<InMemoryPluginRepository>,
    pub settings: Arc<InMemorySettingsStore>,
    pub runtime: Arc<RecordingRuntime>,
    pub installer: Arc<FakeInstaller>,
    pub security: Arc<FakeSecurity>,
    pub events: Arc<InMemoryEventStore>,
    pub manager: PluginManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_fs(Arc::new(LocalFilesystem::new()))
    }

    pub fn with_fs(fs: Arc<dyn Filesystem>) -> Self {
        let tmp = TempDir::new().unwrap();
        let plugins_dir = tmp.path().join("plugins");
        fs::create_dir_all(&plugins_dir).unwrap();

        let repository = Arc::new(InMemoryPluginRepository::new());
        let settings = Arc::new(InMemorySettingsStore::new());
        let runtime = Arc::new(RecordingRuntime::default());
        let installer = Arc::new(FakeInstaller::default());
        let security = Arc::new(FakeSecurity::default());
        let events = Arc::new(InMemoryEventStore::new());

        let validator = PluginManifestValidator::new(Version::parse(HOST_VERSION).unwrap());
        let manager = PluginManager::new(
            PluginScanner::new(&plugins_dir, validator),
            PluginServices {
                repository: repository.clone(),
                settings: settings.clone(),
                loader: runtime.clone(),
                assets: runtime.clone(),
                migrations: runtime.clone(),
                installer: installer.clone(),
                security: security.clone(),
                events: events.clone(),
                fs,
            },
        );

        Self {
            tmp,
            repository,
            settings,
            runtime,
            installer,
            security,
            events,
            manager,
        }
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.tmp.path().join("plugins")
    }

    /// Write a plugin to disk and register it
    pub fn install(&self, name: &str, version: &str, requires: &[(&str, &str)]) -> Plugin {
        let dir = write_plugin(&self.plugins_dir(), name, version, requires);
        let manifest = crate::manifest::load_manifest(&dir).unwrap();
        self.manager.register_plugin(&dir, &manifest).unwrap()
    }

    /// Install, register and enable a plugin
    pub fn enabled(&self, name: &str, version: &str, requires: &[(&str, &str)]) -> Plugin {
        let mut plugin = self.install(name, version, requires);
        let _ = self.manager.enable_plugin(&mut plugin).unwrap().into_result().unwrap();
        plugin
    }

    pub fn stored(&self, name: &str) -> Plugin {
        use crate::ports::PluginRepository;
        self.repository.find_by_name(name).unwrap().unwrap()
    }

    pub fn event_types(&self, name: &str) -> Vec<String> {
        self.events
            .events_for(name)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}
