//! Plugin lifecycle events
//!
//! Every event carries the plugin's id, name, and version plus enough
//! context for an audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hostpanel_core::events::DomainEvent;

use crate::entity::{Plugin, PluginState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginEventType {
    Discovered,
    Registered,
    Enabled,
    Disabled,
    Faulted,
    Updated,
    EnablementFailed,
    DisablementFailed,
    Reset,
    Deleted,
}

impl PluginEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "plugin.discovered",
            Self::Registered => "plugin.registered",
            Self::Enabled => "plugin.enabled",
            Self::Disabled => "plugin.disabled",
            Self::Faulted => "plugin.faulted",
            Self::Updated => "plugin.updated",
            Self::EnablementFailed => "plugin.enablement_failed",
            Self::DisablementFailed => "plugin.disablement_failed",
            Self::Reset => "plugin.reset",
            Self::Deleted => "plugin.deleted",
        }
    }
}

impl std::fmt::Display for PluginEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    pub id: Uuid,
    pub plugin_id: Uuid,
    pub plugin_name: String,
    pub event_type: PluginEventType,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl PluginEvent {
    fn new(plugin: &Plugin, event_type: PluginEventType, extra: serde_json::Value) -> Self {
        let mut data = serde_json::json!({
            "name": plugin.name,
            "version": plugin.version,
            "state": plugin.state().as_str(),
        });
        if let (Some(data), serde_json::Value::Object(extra)) = (data.as_object_mut(), extra) {
            data.extend(extra);
        }
        Self {
            id: Uuid::new_v4(),
            plugin_id: plugin.id,
            plugin_name: plugin.name.clone(),
            event_type,
            data: Some(data),
            created_at: Utc::now(),
        }
    }

    pub fn discovered(plugin: &Plugin) -> Self {
        let data = serde_json::json!({ "path": plugin.path.display().to_string() });
        Self::new(plugin, PluginEventType::Discovered, data)
    }

    pub fn registered(plugin: &Plugin) -> Self {
        let data = serde_json::json!({ "display_name": plugin.display_name });
        Self::new(plugin, PluginEventType::Registered, data)
    }

    pub fn enabled(plugin: &Plugin, migrations: &[String], assets_published: bool) -> Self {
        let data = serde_json::json!({
            "migrations": migrations,
            "assets_published": assets_published,
        });
        Self::new(plugin, PluginEventType::Enabled, data)
    }

    pub fn disabled(plugin: &Plugin, cascade: bool) -> Self {
        Self::new(plugin, PluginEventType::Disabled, serde_json::json!({ "cascade": cascade }))
    }

    pub fn faulted(plugin: &Plugin, previous: PluginState, reason: &str) -> Self {
        let data = serde_json::json!({
            "previous_state": previous.as_str(),
            "reason": reason,
        });
        Self::new(plugin, PluginEventType::Faulted, data)
    }

    pub fn updated(plugin: &Plugin, previous_version: &str) -> Self {
        let data = serde_json::json!({ "previous_version": previous_version });
        Self::new(plugin, PluginEventType::Updated, data)
    }

    pub fn enablement_failed(plugin: &Plugin, reason: &str) -> Self {
        Self::new(plugin, PluginEventType::EnablementFailed, serde_json::json!({ "reason": reason }))
    }

    pub fn disablement_failed(plugin: &Plugin, reason: &str) -> Self {
        Self::new(plugin, PluginEventType::DisablementFailed, serde_json::json!({ "reason": reason }))
    }

    pub fn reset(plugin: &Plugin, previous: PluginState) -> Self {
        let data = serde_json::json!({ "previous_state": previous.as_str() });
        Self::new(plugin, PluginEventType::Reset, data)
    }

    pub fn deleted(plugin: &Plugin, files_removed: bool, settings_removed: usize) -> Self {
        let data = serde_json::json!({
            "files_removed": files_removed,
            "settings_removed": settings_removed,
        });
        Self::new(plugin, PluginEventType::Deleted, data)
    }
}

impl DomainEvent for PluginEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    fn aggregate_id(&self) -> Uuid {
        self.plugin_id
    }

    fn aggregate_name(&self) -> &str {
        &self.plugin_name
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::plugin_with;

    #[test]
    fn events_carry_identity_and_context() {
        let plugin = plugin_with("tickets", "1.2.0", &[]);
        let event = PluginEvent::faulted(&plugin, PluginState::Registered, "eval() in src/Boot.php");

        assert_eq!(event.event_type(), "plugin.faulted");
        assert_eq!(event.aggregate_id(), plugin.id);
        assert_eq!(event.aggregate_name(), "tickets");
        let data = event.data().unwrap();
        assert_eq!(data["version"], "1.2.0");
        assert_eq!(data["previous_state"], "registered");
        assert_eq!(data["reason"], "eval() in src/Boot.php");
    }

    #[test]
    fn enabled_event_lists_migrations() {
        let plugin = plugin_with("tickets", "1.2.0", &[]);
        let event = PluginEvent::enabled(&plugin, &["001_init.sql".to_string()], true);
        let data = event.data().unwrap();
        assert_eq!(data["migrations"][0], "001_init.sql");
        assert_eq!(data["assets_published"], true);
    }
}
