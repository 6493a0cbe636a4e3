//! Plugin entity and lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::manifest::PluginManifest;

/// Lifecycle state of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Found on disk, not yet registered
    Discovered,
    /// Persisted and compatible, not active
    Registered,
    /// Active: loaded, settings initialized, migrations run
    Enabled,
    /// Previously enabled, deactivated
    Disabled,
    /// Enabled plugin whose on-disk version changed; re-enable to apply
    UpdatePending,
    /// Registration or enable failed; see the fault reason
    Faulted,
}

impl PluginState {
    pub const ALL: [PluginState; 6] = [
        Self::Discovered,
        Self::Registered,
        Self::Enabled,
        Self::Disabled,
        Self::UpdatePending,
        Self::Faulted,
    ];

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "discovered" => Some(Self::Discovered),
            "registered" => Some(Self::Registered),
            "enabled" => Some(Self::Enabled),
            "disabled" => Some(Self::Disabled),
            "update_pending" => Some(Self::UpdatePending),
            "faulted" => Some(Self::Faulted),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Registered => "registered",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::UpdatePending => "update_pending",
            Self::Faulted => "faulted",
        }
    }

    /// States from which the enable pipeline may run
    pub fn can_be_enabled(&self) -> bool {
        matches!(self, Self::Registered | Self::Disabled | Self::UpdatePending)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// A plugin known to the system
///
/// `state` and `fault_reason` are private so they can only change through
/// [`crate::PluginStateMachine`]; the fault reason is set exactly when the
/// state is [`PluginState::Faulted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: Uuid,
    /// Unique, derived from the plugin directory
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub license: String,
    state: PluginState,
    fault_reason: Option<String>,
    /// Plugin name -> version constraint
    pub requires: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    /// Raw manifest payload, kept as an audit trail
    pub manifest: serde_json::Value,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plugin {
    /// Build an unpersisted plugin in the `Discovered` state
    pub fn from_manifest(path: impl Into<PathBuf>, manifest: &PluginManifest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: manifest.name.clone(),
            display_name: manifest.display_name().to_string(),
            version: manifest.version.clone(),
            author: manifest.author.clone(),
            description: manifest.description.clone(),
            license: manifest.license.clone(),
            state: PluginState::Discovered,
            fault_reason: None,
            requires: manifest.requires.clone(),
            capabilities: manifest.capabilities.clone(),
            manifest: manifest.raw.clone(),
            path: path.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn fault_reason(&self) -> Option<&str> {
        self.fault_reason.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.state == PluginState::Enabled
    }

    pub fn is_faulted(&self) -> bool {
        self.state == PluginState::Faulted
    }

    /// Whether this plugin declares a requirement on `name`
    pub fn requires_plugin(&self, name: &str) -> bool {
        self.requires.contains_key(name)
    }

    /// Replace version, manifest and requirements after an on-disk update
    pub fn apply_manifest(&mut self, manifest: &PluginManifest) {
        self.display_name = manifest.display_name().to_string();
        self.version = manifest.version.clone();
        self.author = manifest.author.clone();
        self.description = manifest.description.clone();
        self.license = manifest.license.clone();
        self.requires = manifest.requires.clone();
        self.capabilities = manifest.capabilities.clone();
        self.manifest = manifest.raw.clone();
        self.touch();
    }

    /// Parsed manifest stored on the entity
    pub fn parsed_manifest(&self) -> PluginManifest {
        let mut manifest: PluginManifest =
            serde_json::from_value(self.manifest.clone()).unwrap_or_default();
        manifest.raw = self.manifest.clone();
        manifest
    }

    pub(crate) fn set_state(&mut self, state: PluginState, fault_reason: Option<String>) {
        self.state = state;
        self.fault_reason = fault_reason;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_strings() {
        for state in PluginState::ALL {
            assert_eq!(PluginState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(PluginState::from_str("UPDATE-PENDING"), Some(PluginState::UpdatePending));
        assert_eq!(PluginState::from_str("active"), None);
        assert_eq!(PluginState::UpdatePending.to_string(), "UPDATE_PENDING");
    }

    #[test]
    fn new_plugin_is_discovered_without_fault() {
        let manifest = PluginManifest::from_json(
            r#"{"name": "tickets", "version": "1.0.0", "requires": {"core": "^1.0"}}"#,
        )
        .unwrap();
        let plugin = Plugin::from_manifest("/srv/plugins/tickets", &manifest);

        assert_eq!(plugin.state(), PluginState::Discovered);
        assert!(plugin.fault_reason().is_none());
        assert_eq!(plugin.display_name, "tickets");
        assert!(plugin.requires_plugin("core"));
        assert_eq!(plugin.parsed_manifest().name, "tickets");
    }

    #[test]
    fn serde_keeps_private_state() {
        let manifest = PluginManifest::from_json(r#"{"name": "tickets", "version": "1.0.0"}"#).unwrap();
        let mut plugin = Plugin::from_manifest("/srv/plugins/tickets", &manifest);
        plugin.set_state(PluginState::Faulted, Some("broken".into()));

        let json = serde_json::to_string(&plugin).unwrap();
        let back: Plugin = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state(), PluginState::Faulted);
        assert_eq!(back.fault_reason(), Some("broken"));
    }
}
