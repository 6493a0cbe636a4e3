//! Plugin lifecycle orchestration
//!
//! [`PluginManager`] composes the scanner, validator, resolver and state
//! machine with the side-effecting ports. Every operation validates before it
//! mutates anything; the only failures that change state are security faults
//! and side-effect failures, both of which leave the plugin `Faulted`.
//!
//! Committed operations return a [`PostCommit`] signal. The host applies it
//! once it knows the change is durable, which clears compiled caches and
//! rebuilds the enabled-plugins cache.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use hostpanel_core::events::EventPublisher;
use hostpanel_core::fs::Filesystem;

use crate::cache::PostCommit;
use crate::entity::{Plugin, PluginState};
use crate::events::PluginEvent;
use crate::manifest::PluginManifest;
use crate::packages::{InstallOutput, PackageInstaller};
use crate::ports::{AssetPublisher, MigrationRunner, PluginRepository, RuntimeLoader, SettingsStore};
use crate::resolver::DependencyResolver;
use crate::scanner::{PluginScanner, ScannedPlugin};
use crate::security::{IssueSeverity, SecurityScanner};
use crate::state_machine::PluginStateMachine;
use crate::{PluginError, PluginResult};

/// Collaborators injected into the manager
pub struct PluginServices {
    pub repository: Arc<dyn PluginRepository>,
    pub settings: Arc<dyn SettingsStore>,
    pub loader: Arc<dyn RuntimeLoader>,
    pub assets: Arc<dyn AssetPublisher>,
    pub migrations: Arc<dyn MigrationRunner>,
    pub installer: Arc<dyn PackageInstaller>,
    pub security: Arc<dyn SecurityScanner>,
    pub events: Arc<dyn EventPublisher>,
    pub fs: Arc<dyn Filesystem>,
}

/// Result of a bulk discovery run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub discovered: usize,
    pub registered: usize,
    pub updated: usize,
    pub failed: usize,
    /// Plugin name -> problems that prevented registration
    pub errors: BTreeMap<String, Vec<String>>,
}

/// Outcome of [`PluginManager::enable_plugin`]
///
/// Gate failures are values, not errors, so callers can tell "nothing
/// happened" (`ValidationFailed`, `DependencyBlocked`) apart from "the plugin
/// is now faulted" (`SecurityFaulted`).
#[derive(Debug)]
#[must_use]
pub enum EnableOutcome {
    Enabled(PostCommit),
    /// Package gate failed; state unchanged
    ValidationFailed { plugin: String, errors: Vec<String> },
    /// Critical security finding; the plugin is now `Faulted`
    SecurityFaulted { plugin: String, reason: String },
    /// Unmet or circular requirements; state unchanged
    DependencyBlocked { plugin: String, errors: Vec<String> },
}

impl EnableOutcome {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Collapse every non-success outcome into its error
    pub fn into_result(self) -> PluginResult<PostCommit> {
        match self {
            Self::Enabled(post_commit) => Ok(post_commit),
            Self::ValidationFailed { plugin, errors } => Err(PluginError::EnableRejected { plugin, errors }),
            Self::SecurityFaulted { plugin, reason } => Err(PluginError::Security { plugin, reason }),
            Self::DependencyBlocked { plugin, errors } => Err(PluginError::dependency(format!(
                "Cannot enable plugin '{}' due to unmet dependencies:\n- {}",
                plugin,
                errors.join("\n- ")
            ))),
        }
    }
}

enum Discovery {
    Registered,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PluginStatistics {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub faulted: usize,
}

pub struct PluginManager {
    scanner: PluginScanner,
    resolver: DependencyResolver,
    state_machine: PluginStateMachine,
    repository: Arc<dyn PluginRepository>,
    settings: Arc<dyn SettingsStore>,
    loader: Arc<dyn RuntimeLoader>,
    assets: Arc<dyn AssetPublisher>,
    migrations: Arc<dyn MigrationRunner>,
    installer: Arc<dyn PackageInstaller>,
    security: Arc<dyn SecurityScanner>,
    events: Arc<dyn EventPublisher>,
    fs: Arc<dyn Filesystem>,
}

impl PluginManager {
    pub fn new(scanner: PluginScanner, services: PluginServices) -> Self {
        Self {
            scanner,
            resolver: DependencyResolver::new(services.repository.clone()),
            state_machine: PluginStateMachine::new(),
            repository: services.repository,
            settings: services.settings,
            loader: services.loader,
            assets: services.assets,
            migrations: services.migrations,
            installer: services.installer,
            security: services.security,
            events: services.events,
            fs: services.fs,
        }
    }

    pub fn scanner(&self) -> &PluginScanner {
        &self.scanner
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Scan the plugins directory and register or update every candidate
    ///
    /// A failing plugin is recorded in the report and never aborts the run.
    pub fn discover_and_register_plugins(&self) -> PluginResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        for scanned in self.scanner.scan()? {
            report.discovered += 1;
            match self.discover_one(&scanned) {
                Ok(Discovery::Registered) => {
                    report.registered += 1;
                    tracing::info!(plugin = %scanned.name, "Registered new plugin");
                }
                Ok(Discovery::Updated) => report.updated += 1,
                Ok(Discovery::Unchanged) => {}
                Err(PluginError::InvalidManifest(errors)) => {
                    tracing::warn!(plugin = %scanned.name, errors = ?errors, "Plugin has validation errors");
                    report.failed += 1;
                    report.errors.insert(scanned.name, errors);
                }
                Err(e) => {
                    tracing::error!(plugin = %scanned.name, error = %e, "Failed to register plugin");
                    report.failed += 1;
                    report.errors.insert(scanned.name, vec![e.to_string()]);
                }
            }
        }

        tracing::info!(
            discovered = report.discovered,
            registered = report.registered,
            updated = report.updated,
            failed = report.failed,
            "Plugin discovery finished"
        );
        Ok(report)
    }

    fn discover_one(&self, scanned: &ScannedPlugin) -> PluginResult<Discovery> {
        if let Some(mut existing) = self.repository.find_by_name(&scanned.name)? {
            return match &scanned.manifest {
                Some(manifest) if existing.version != manifest.version => {
                    self.handle_plugin_update(&mut existing, manifest)?;
                    Ok(Discovery::Updated)
                }
                _ => Ok(Discovery::Unchanged),
            };
        }

        match &scanned.manifest {
            Some(manifest) if scanned.errors.is_empty() => {
                self.register_plugin(&scanned.path, manifest)?;
                Ok(Discovery::Registered)
            }
            _ => Err(PluginError::InvalidManifest(scanned.errors.clone())),
        }
    }

    /// Register a plugin found at `path`
    ///
    /// Idempotent on the plugin name: an existing record is returned, updated
    /// first if the manifest version changed. An incompatible host range is
    /// persisted as `Faulted`.
    pub fn register_plugin(&self, path: &Path, manifest: &PluginManifest) -> PluginResult<Plugin> {
        if let Some(mut existing) = self.repository.find_by_name(&manifest.name)? {
            if existing.version != manifest.version {
                self.handle_plugin_update(&mut existing, manifest)?;
            }
            return Ok(existing);
        }

        let orphaned = self.settings.delete_all(&manifest.name)?;
        if orphaned > 0 {
            tracing::info!(plugin = %manifest.name, count = orphaned, "Removed orphaned settings from a previous installation");
        }

        let mut plugin = Plugin::from_manifest(path, manifest);
        match self.scanner.validator().check_compatibility(manifest) {
            Ok(()) => {
                self.state_machine.transition(&mut plugin, PluginState::Registered)?;
                self.repository.save(&plugin)?;
                self.emit(PluginEvent::discovered(&plugin));
                self.emit(PluginEvent::registered(&plugin));
            }
            Err(reason) => {
                self.state_machine.fault(&mut plugin, reason.clone())?;
                self.repository.save(&plugin)?;
                self.emit(PluginEvent::faulted(&plugin, PluginState::Discovered, &reason));
                tracing::warn!(plugin = %plugin.name, reason = %reason, "Plugin is incompatible with this host");
            }
        }

        if plugin.state() == PluginState::Registered {
            match self.settings.initialize_defaults(&plugin) {
                Ok(0) => {}
                Ok(count) => tracing::info!(plugin = %plugin.name, count, "Initialized default settings"),
                Err(e) => tracing::error!(plugin = %plugin.name, error = %e, "Failed to initialize settings during registration"),
            }
        }

        Ok(plugin)
    }

    /// Apply a changed on-disk manifest to a known plugin
    ///
    /// Enabled plugins move to `UpdatePending` until they are re-enabled.
    pub fn handle_plugin_update(&self, plugin: &mut Plugin, manifest: &PluginManifest) -> PluginResult<()> {
        let previous_version = plugin.version.clone();
        plugin.apply_manifest(manifest);
        if plugin.is_enabled() {
            self.state_machine.transition(plugin, PluginState::UpdatePending)?;
        }
        self.repository.save(plugin)?;
        self.emit(PluginEvent::updated(plugin, &previous_version));
        tracing::info!(
            plugin = %plugin.name,
            from = %previous_version,
            to = %plugin.version,
            state = %plugin.state(),
            "Plugin updated"
        );
        Ok(())
    }

    /// Run the enable pipeline
    ///
    /// Gates run in order: state transition, dependencies, cycles, package
    /// readiness, security. Only then is the plugin persisted as `Enabled` and
    /// loaded. A failing side effect faults the plugin and is returned as
    /// [`PluginError::SideEffect`].
    pub fn enable_plugin(&self, plugin: &mut Plugin) -> PluginResult<EnableOutcome> {
        self.state_machine.validate_transition(plugin, PluginState::Enabled)?;

        let unmet = self.resolver.validate_dependencies(plugin)?;
        if !unmet.is_empty() {
            self.enablement_failed(plugin, &unmet);
            return Ok(EnableOutcome::DependencyBlocked {
                plugin: plugin.name.clone(),
                errors: unmet,
            });
        }

        if let Some(path) = self.resolver.get_circular_dependency_path(plugin)? {
            let errors = vec![format!("Circular dependency detected: {}", path.join(" → "))];
            self.enablement_failed(plugin, &errors);
            return Ok(EnableOutcome::DependencyBlocked {
                plugin: plugin.name.clone(),
                errors,
            });
        }

        let package_errors = self.check_packages(plugin);
        if !package_errors.is_empty() {
            self.enablement_failed(plugin, &package_errors);
            return Ok(EnableOutcome::ValidationFailed {
                plugin: plugin.name.clone(),
                errors: package_errors,
            });
        }

        let report = self.security.scan(plugin)?;
        if report.has_critical() {
            let reason = format!("Critical security issues: {}", report.critical_summary());
            let previous = plugin.state();
            self.state_machine.fault(plugin, reason.clone())?;
            self.repository.save(plugin)?;
            self.enablement_failed(plugin, std::slice::from_ref(&reason));
            self.emit(PluginEvent::faulted(plugin, previous, &reason));
            tracing::error!(plugin = %plugin.name, reason = %reason, "Plugin enablement blocked by security scan");
            return Ok(EnableOutcome::SecurityFaulted {
                plugin: plugin.name.clone(),
                reason,
            });
        }
        for issue in report.with_severity(IssueSeverity::High) {
            tracing::warn!(plugin = %plugin.name, file = %issue.file, "{}", issue.message);
        }

        self.state_machine.transition(plugin, PluginState::Enabled)?;
        self.repository.save(plugin)?;

        let (migrations, published) = match self.activate(plugin) {
            Ok(done) => done,
            Err(e) => {
                let reason = e.to_string();
                self.state_machine.fault(plugin, reason.clone())?;
                self.repository.save(plugin)?;
                self.emit(PluginEvent::faulted(plugin, PluginState::Enabled, &reason));
                tracing::error!(plugin = %plugin.name, error = %reason, "Plugin failed to load and was faulted");
                return Err(PluginError::SideEffect {
                    plugin: plugin.name.clone(),
                    source: Box::new(e),
                });
            }
        };

        self.emit(PluginEvent::enabled(plugin, &migrations, published));
        tracing::info!(plugin = %plugin.name, version = %plugin.version, migrations = migrations.len(), "Plugin enabled");
        Ok(EnableOutcome::Enabled(PostCommit::new("enable", vec![plugin.name.clone()])))
    }

    /// Disable a plugin, and with `cascade` every enabled plugin depending on it
    ///
    /// Dependents are disabled depth-first before the plugin itself; the
    /// returned signal lists plugins in the order they were disabled.
    pub fn disable_plugin(&self, plugin: &mut Plugin, cascade: bool) -> PluginResult<PostCommit> {
        let mut disabled = Vec::new();
        self.disable_recursive(plugin, cascade, &mut disabled)?;
        Ok(PostCommit::new("disable", disabled))
    }

    fn disable_recursive(&self, plugin: &mut Plugin, cascade: bool, disabled: &mut Vec<String>) -> PluginResult<()> {
        self.state_machine.validate_transition(plugin, PluginState::Disabled)?;

        let dependents = self.resolver.get_enabled_dependents(plugin)?;
        if !dependents.is_empty() && !cascade {
            let message = format!(
                "Cannot disable plugin '{}' because the following plugins depend on it: {}.\nUse the cascade option to disable them as well.",
                plugin.display_name,
                quoted_names(&dependents)
            );
            self.emit(PluginEvent::disablement_failed(plugin, &message));
            tracing::warn!(plugin = %plugin.name, dependents = dependents.len(), "Plugin disablement blocked by dependents");
            return Err(PluginError::dependency(message));
        }

        for dependent in dependents {
            // An earlier branch of the cascade may already have disabled it
            let Some(mut current) = self.repository.find_by_name(&dependent.name)? else {
                continue;
            };
            if !current.is_enabled() {
                continue;
            }
            tracing::info!(plugin = %plugin.name, dependent = %current.name, "Cascade disabling dependent plugin");
            self.disable_recursive(&mut current, true, disabled)?;
        }

        self.loader.unload(plugin)?;
        self.assets.unpublish(plugin)?;
        self.state_machine.transition(plugin, PluginState::Disabled)?;
        self.repository.save(plugin)?;
        self.emit(PluginEvent::disabled(plugin, cascade));
        tracing::info!(plugin = %plugin.name, "Plugin disabled");
        disabled.push(plugin.name.clone());
        Ok(())
    }

    /// Move a `Faulted` or `Discovered` plugin back to `Registered`
    pub fn reset_plugin(&self, plugin: &mut Plugin) -> PluginResult<()> {
        let previous = plugin.state();
        let previous_reason = plugin.fault_reason().map(str::to_string);

        self.state_machine.transition(plugin, PluginState::Registered)?;
        self.repository.save(plugin)?;
        self.emit(PluginEvent::reset(plugin, previous));
        tracing::info!(
            plugin = %plugin.name,
            previous_state = %previous,
            previous_fault_reason = ?previous_reason,
            "Plugin reset to REGISTERED"
        );
        Ok(())
    }

    /// Remove a plugin's record and settings, and optionally its files
    ///
    /// Enabled dependents block deletion before anything is touched. Once the
    /// record is gone, a failed cleanup step is reported as
    /// [`PluginError::ManualCleanup`], which still carries the cache refresh.
    pub fn delete_plugin(&self, plugin: &mut Plugin, remove_files: bool) -> PluginResult<PostCommit> {
        let dependents = self.resolver.get_enabled_dependents(plugin)?;
        if !dependents.is_empty() {
            return Err(PluginError::dependency(format!(
                "Cannot delete plugin '{}' because the following plugins depend on it: {}.\nDisable or delete these plugins first.",
                plugin.display_name,
                quoted_names(&dependents)
            )));
        }

        if plugin.is_enabled() {
            tracing::info!(plugin = %plugin.name, "Disabling plugin before deletion");
            self.disable_recursive(plugin, false, &mut Vec::new()).map_err(|e| {
                tracing::error!(plugin = %plugin.name, error = %e, "Failed to disable plugin before deletion");
                PluginError::runtime(&plugin.name, format!("failed to disable plugin before deletion: {}", e))
            })?;
        }

        self.repository.remove(&plugin.name)?;
        let post_commit = PostCommit::new("delete", vec![plugin.name.clone()]);
        let plugin_dir = self.scanner.plugin_path(&plugin.name);

        let settings_removed = match self.settings.delete_all(&plugin.name) {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(plugin = %plugin.name, error = %e, "Plugin record removed but its settings could not be deleted");
                return Err(PluginError::ManualCleanup {
                    plugin: plugin.name.clone(),
                    message: format!("deleting its settings failed: {}", e),
                    path: plugin_dir,
                    post_commit,
                });
            }
        };
        tracing::info!(plugin = %plugin.name, settings_removed, "Removed plugin record");

        let mut files_removed = false;
        if remove_files {
            if self.fs.exists(&plugin_dir) {
                if let Err(e) = self.fs.remove(&plugin_dir) {
                    tracing::error!(
                        plugin = %plugin.name,
                        path = %plugin_dir.display(),
                        error = %e,
                        "Plugin record removed but its directory could not be deleted; manual cleanup required"
                    );
                    return Err(PluginError::ManualCleanup {
                        plugin: plugin.name.clone(),
                        message: format!("deleting '{}' failed: {}", plugin_dir.display(), e),
                        path: plugin_dir,
                        post_commit,
                    });
                }
                files_removed = true;
                tracing::info!(plugin = %plugin.name, path = %plugin_dir.display(), "Deleted plugin directory");
            } else {
                tracing::warn!(plugin = %plugin.name, path = %plugin_dir.display(), "Plugin directory already missing");
            }
        }

        self.emit(PluginEvent::deleted(plugin, files_removed, settings_removed));
        Ok(post_commit)
    }

    /// Install a plugin's package dependencies on demand
    ///
    /// Returns `None` when the plugin declares no package dependencies.
    pub fn install_dependencies(&self, plugin: &Plugin, clean: bool) -> PluginResult<Option<InstallOutput>> {
        if !self.installer.requires_dependencies(plugin)? {
            return Ok(None);
        }
        if !self.installer.has_lock_file(plugin) {
            return Err(self.missing_lock(plugin));
        }
        self.installer.install(plugin, clean).map(Some)
    }

    pub fn get_plugin_by_name(&self, name: &str) -> PluginResult<Option<Plugin>> {
        Ok(self.repository.find_by_name(name)?)
    }

    /// Like [`Self::get_plugin_by_name`], but a missing plugin is an error
    pub fn find_plugin(&self, name: &str) -> PluginResult<Plugin> {
        self.get_plugin_by_name(name)?
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    pub fn get_all_plugins(&self) -> PluginResult<Vec<Plugin>> {
        Ok(self.repository.find_all()?)
    }

    pub fn get_plugins_in_state(&self, state: PluginState) -> PluginResult<Vec<Plugin>> {
        Ok(self.repository.find_by_state(state)?)
    }

    pub fn get_enabled_plugins(&self) -> PluginResult<Vec<Plugin>> {
        Ok(self.repository.find_enabled()?)
    }

    pub fn get_disabled_plugins(&self) -> PluginResult<Vec<Plugin>> {
        Ok(self.repository.find_disabled()?)
    }

    pub fn get_faulted_plugins(&self) -> PluginResult<Vec<Plugin>> {
        Ok(self.repository.find_faulted()?)
    }

    pub fn has_plugin(&self, name: &str) -> PluginResult<bool> {
        Ok(self.repository.exists(name)?)
    }

    /// Return the stored plugin, registering it from disk if it is unknown
    pub fn get_or_create_plugin(&self, name: &str) -> PluginResult<Plugin> {
        if let Some(plugin) = self.repository.find_by_name(name)? {
            return Ok(plugin);
        }

        let dir = self.scanner.plugin_path(name);
        if !dir.is_dir() {
            return Err(PluginError::NotFound(name.to_string()));
        }
        let scanned = self.scanner.scan_plugin(&dir);
        let Some(manifest) = scanned.manifest.as_ref().filter(|_| scanned.errors.is_empty()) else {
            return Err(PluginError::InvalidManifest(scanned.errors));
        };

        let plugin = self.register_plugin(&scanned.path, manifest)?;
        tracing::info!(plugin = %name, state = %plugin.state(), "Created plugin record from disk");
        Ok(plugin)
    }

    pub fn statistics(&self) -> PluginResult<PluginStatistics> {
        Ok(PluginStatistics {
            total: self.repository.count()?,
            enabled: self.repository.count_by_state(PluginState::Enabled)?,
            disabled: self.repository.count_by_state(PluginState::Disabled)?,
            faulted: self.repository.count_by_state(PluginState::Faulted)?,
        })
    }

    /// Load the runtime, then settings, migrations and assets
    fn activate(&self, plugin: &Plugin) -> PluginResult<(Vec<String>, bool)> {
        self.loader.load(plugin)?;
        let initialized = self.settings.initialize_defaults(plugin)?;
        if initialized > 0 {
            tracing::info!(plugin = %plugin.name, count = initialized, "Initialized additional settings");
        }
        let migrations = self.migrations.run_pending(plugin)?;
        let published = self.assets.publish(plugin)?;
        Ok((migrations, published))
    }

    /// Package readiness gate; installs missing dependencies when a lock file exists
    fn check_packages(&self, plugin: &Plugin) -> Vec<String> {
        match self.installer.requires_dependencies(plugin) {
            Ok(false) => return Vec::new(),
            Ok(true) => {}
            Err(e) => return vec![e.to_string()],
        }

        if !self.installer.has_lock_file(plugin) {
            return vec![self.missing_lock(plugin).to_string()];
        }
        if self.installer.is_installed(plugin) {
            tracing::debug!(plugin = %plugin.name, "Package dependencies already installed");
            return Vec::new();
        }

        tracing::info!(plugin = %plugin.name, "Installing missing package dependencies");
        match self.installer.install(plugin, false) {
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::error!(plugin = %plugin.name, error = %e, "Automatic dependency installation failed");
                vec![
                    e.to_string(),
                    format!("Retry manually with `hostpanel plugins install-deps {}`", plugin.name),
                ]
            }
        }
    }

    fn missing_lock(&self, plugin: &Plugin) -> PluginError {
        PluginError::MissingLockFile {
            plugin: plugin.name.clone(),
            path: plugin.path.display().to_string(),
        }
    }

    fn enablement_failed(&self, plugin: &Plugin, errors: &[String]) {
        tracing::warn!(plugin = %plugin.name, errors = ?errors, "Plugin enablement failed");
        self.emit(PluginEvent::enablement_failed(plugin, &errors.join("\n")));
    }

    fn emit(&self, event: PluginEvent) {
        if let Err(e) = self.events.publish(&event) {
            tracing::warn!(event = %event.event_type, plugin = %event.plugin_name, error = %e, "Failed to publish plugin event");
        }
    }
}

fn quoted_names(plugins: &[Plugin]) -> String {
    plugins
        .iter()
        .map(|p| format!("'{}'", p.display_name))
        .collect::<Vec<_>>()
        .join(", ")
}
