//! Plugin lifecycle state machine
//!
//! A pure guard over [`Plugin`] state. It validates and applies transitions;
//! every side effect belongs to the manager.
//!
//! Legal transitions:
//!
//! | from           | to                                   |
//! |----------------|--------------------------------------|
//! | Discovered     | Registered, Faulted                  |
//! | Registered     | Enabled, Faulted                     |
//! | Enabled        | Disabled, UpdatePending, Faulted     |
//! | Disabled       | Enabled                              |
//! | UpdatePending  | Enabled                              |
//! | Faulted        | Registered                           |
//!
//! Entering `Faulted` always requires a reason and goes through
//! [`PluginStateMachine::fault`]. A fault raised by the enable pipeline is
//! also accepted from `Disabled` and `UpdatePending`, since those states
//! run the same gates as `Registered`.

use crate::entity::{Plugin, PluginState};
use crate::{PluginError, PluginResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct PluginStateMachine;

impl PluginStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Whether `from -> to` is in the transition table
    pub fn can_transition(&self, from: PluginState, to: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (from, to),
            (Discovered, Registered)
                | (Discovered, Faulted)
                | (Registered, Enabled)
                | (Registered, Faulted)
                | (Enabled, Disabled)
                | (Enabled, UpdatePending)
                | (Enabled, Faulted)
                | (Disabled, Enabled)
                | (UpdatePending, Enabled)
                | (Faulted, Registered)
        )
    }

    /// States reachable from `from`
    pub fn allowed_targets(&self, from: PluginState) -> Vec<PluginState> {
        PluginState::ALL
            .into_iter()
            .filter(|to| self.can_transition(from, *to))
            .collect()
    }

    /// Check a transition without applying it
    pub fn validate_transition(&self, plugin: &Plugin, to: PluginState) -> PluginResult<()> {
        if to == PluginState::Faulted {
            return Err(self.invalid(plugin, to, Some("A fault must carry a reason".to_string())));
        }
        if self.can_transition(plugin.state(), to) {
            return Ok(());
        }

        let hint = match (plugin.state(), to) {
            (PluginState::Discovered, PluginState::Enabled) => {
                Some("Register the plugin before enabling it".to_string())
            }
            (PluginState::Faulted, _) => {
                Some("Reset the plugin to clear its fault first".to_string())
            }
            (PluginState::Enabled, PluginState::Enabled) => {
                Some("The plugin is already enabled".to_string())
            }
            (from, _) if from != PluginState::Enabled && to == PluginState::Disabled => {
                Some("Only enabled plugins can be disabled".to_string())
            }
            _ => None,
        };
        Err(self.invalid(plugin, to, hint))
    }

    /// Apply a non-fault transition
    ///
    /// Leaving `Faulted` clears the fault reason.
    pub fn transition(&self, plugin: &mut Plugin, to: PluginState) -> PluginResult<()> {
        self.validate_transition(plugin, to)?;
        tracing::debug!(plugin = %plugin.name, from = %plugin.state(), to = %to, "Plugin state transition");
        plugin.set_state(to, None);
        Ok(())
    }

    /// Whether the plugin may be faulted from its current state
    pub fn can_fault(&self, plugin: &Plugin) -> bool {
        plugin.state() != PluginState::Faulted
    }

    /// Move a plugin to `Faulted`, recording why
    pub fn fault(&self, plugin: &mut Plugin, reason: impl Into<String>) -> PluginResult<()> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(self.invalid(
                plugin,
                PluginState::Faulted,
                Some("A fault must carry a reason".to_string()),
            ));
        }
        if !self.can_fault(plugin) {
            return Err(self.invalid(
                plugin,
                PluginState::Faulted,
                Some("The plugin is already faulted".to_string()),
            ));
        }
        tracing::debug!(plugin = %plugin.name, from = %plugin.state(), reason = %reason, "Plugin faulted");
        plugin.set_state(PluginState::Faulted, Some(reason));
        Ok(())
    }

    fn invalid(&self, plugin: &Plugin, to: PluginState, hint: Option<String>) -> PluginError {
        PluginError::InvalidStateTransition {
            plugin: plugin.name.clone(),
            from: plugin.state(),
            to,
            hint,
        }
    }
}
