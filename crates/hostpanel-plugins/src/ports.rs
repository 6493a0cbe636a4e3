//! Ports the plugin manager depends on
//!
//! The manager only holds these abstractions. Disk-backed implementations
//! live in [`crate::adapters`]; tests substitute in-memory fakes.

use hostpanel_core::Result;

use crate::PluginResult;
use crate::entity::{Plugin, PluginState};

/// Persistence for plugin records
///
/// Implementations must keep `name` unique: `save` replaces the record with
/// the same name.
pub trait PluginRepository: Send + Sync {
    fn find_by_name(&self, name: &str) -> Result<Option<Plugin>>;

    /// All plugins ordered by name
    fn find_all(&self) -> Result<Vec<Plugin>>;

    fn find_by_state(&self, state: PluginState) -> Result<Vec<Plugin>>;

    fn count_by_state(&self, state: PluginState) -> Result<usize>;

    fn save(&self, plugin: &Plugin) -> Result<()>;

    /// Remove a record. Returns whether one existed.
    fn remove(&self, name: &str) -> Result<bool>;

    fn find_enabled(&self) -> Result<Vec<Plugin>> {
        self.find_by_state(PluginState::Enabled)
    }

    fn find_disabled(&self) -> Result<Vec<Plugin>> {
        self.find_by_state(PluginState::Disabled)
    }

    fn find_faulted(&self) -> Result<Vec<Plugin>> {
        self.find_by_state(PluginState::Faulted)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.find_all()?.len())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.find_by_name(name)?.is_some())
    }
}

/// Plugin settings storage
pub trait SettingsStore: Send + Sync {
    /// Create settings declared in the plugin's config schema that do not
    /// exist yet. Returns how many were created.
    fn initialize_defaults(&self, plugin: &Plugin) -> Result<usize>;

    /// Delete every setting of a plugin. Returns how many were removed.
    fn delete_all(&self, plugin_name: &str) -> Result<usize>;
}

/// Registers a plugin's services and routes with the running host
///
/// Only called after a state transition has been applied.
pub trait RuntimeLoader: Send + Sync {
    fn load(&self, plugin: &Plugin) -> PluginResult<()>;

    fn unload(&self, plugin: &Plugin) -> PluginResult<()>;
}

/// Publishes a plugin's static assets to the public directory
pub trait AssetPublisher: Send + Sync {
    /// Returns whether anything was published
    fn publish(&self, plugin: &Plugin) -> PluginResult<bool>;

    fn unpublish(&self, plugin: &Plugin) -> PluginResult<()>;
}

/// Runs a plugin's pending database migrations
pub trait MigrationRunner: Send + Sync {
    /// Returns the names of the migrations that ran
    fn run_pending(&self, plugin: &Plugin) -> PluginResult<Vec<String>>;
}
