//! Hostpanel Plugin System
//!
//! Lifecycle management for filesystem-discovered plugins:
//! - Manifest loading and validation (`plugin.json`)
//! - Dependency resolution with version constraints and cycle detection
//! - A guarded lifecycle state machine
//! - Static security scanning and package-dependency installation
//! - The orchestrator composing all of the above behind narrow ports

pub mod adapters;
pub mod cache;
pub mod entity;
pub mod events;
pub mod manager;
pub mod manifest;
pub mod packages;
pub mod ports;
pub mod resolver;
pub mod scanner;
pub mod security;
pub mod state_machine;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use cache::{EnabledPluginsCache, PostCommit};
pub use entity::{Plugin, PluginState};
pub use manager::{DiscoveryReport, EnableOutcome, PluginManager, PluginServices, PluginStatistics};
pub use manifest::PluginManifest;
pub use resolver::DependencyResolver;
pub use state_machine::PluginStateMachine;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin '{0}' not found. Run `hostpanel plugins discover` to scan the plugins directory.")]
    NotFound(String),

    #[error("Plugin manifest is invalid: {}", .0.join("; "))]
    InvalidManifest(Vec<String>),

    #[error("Plugin '{plugin}' cannot move from {from} to {to}{}", hint_suffix(.hint))]
    InvalidStateTransition {
        plugin: String,
        from: PluginState,
        to: PluginState,
        hint: Option<String>,
    },

    #[error("{0}")]
    Dependency(String),

    #[error("Security check failed for plugin '{plugin}': {reason}")]
    Security { plugin: String, reason: String },

    #[error("Plugin '{plugin}' is missing composer.lock. Run `composer update` in {path} to regenerate it.")]
    MissingLockFile { plugin: String, path: String },

    #[error("Failed to install dependencies for plugin '{plugin}': {output}")]
    PackageInstall { plugin: String, output: String },

    #[error("Failed to load plugin '{plugin}': {source}")]
    SideEffect {
        plugin: String,
        #[source]
        source: Box<PluginError>,
    },

    #[error("Cannot enable plugin '{plugin}':\n- {}", .errors.join("\n- "))]
    EnableRejected { plugin: String, errors: Vec<String> },

    #[error("Runtime error for plugin '{plugin}': {message}")]
    Runtime { plugin: String, message: String },

    /// The record is gone but cleanup did not finish; the cache must still be refreshed
    #[error("Plugin '{plugin}' was removed, but {message}. Manual cleanup is required.")]
    ManualCleanup {
        plugin: String,
        message: String,
        path: PathBuf,
        post_commit: PostCommit,
    },

    #[error(transparent)]
    Core(#[from] hostpanel_core::Error),

    #[error("Plugin IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PluginError {
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency(message.into())
    }

    pub fn runtime(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Cache refresh still owed by a partially completed operation
    pub fn pending_post_commit(&self) -> Option<&PostCommit> {
        match self {
            Self::ManualCleanup { post_commit, .. } => Some(post_commit),
            _ => None,
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E500",
            Self::InvalidManifest(_) => "E501",
            Self::InvalidStateTransition { .. } => "E502",
            Self::Dependency(_) => "E503",
            Self::Security { .. } => "E504",
            Self::MissingLockFile { .. } => "E505",
            Self::PackageInstall { .. } => "E506",
            Self::SideEffect { .. } => "E507",
            Self::Runtime { .. } => "E508",
            Self::EnableRejected { .. } => "E509",
            Self::ManualCleanup { .. } => "E510",
            Self::Core(inner) => inner.code(),
            Self::IoError(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound(_) => Some("hostpanel plugins discover".to_string()),
            Self::InvalidStateTransition { plugin, from, .. } => match from {
                PluginState::Discovered => Some("hostpanel plugins discover".to_string()),
                PluginState::Faulted => Some(format!("hostpanel plugins reset {}", plugin)),
                _ => None,
            },
            Self::PackageInstall { plugin, .. } | Self::EnableRejected { plugin, .. } => {
                Some(format!("hostpanel plugins install-deps {} --clean", plugin))
            }
            Self::Security { plugin, .. } | Self::SideEffect { plugin, .. } => {
                Some(format!("hostpanel plugins reset {}", plugin))
            }
            Self::ManualCleanup { path, .. } => Some(format!("rm -r {}", path.display())),
            Self::Core(inner) => inner.suggestion(),
            _ => None,
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|h| format!(". {}", h))
        .unwrap_or_default()
}
