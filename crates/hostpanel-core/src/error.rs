//! Error types for Hostpanel

use thiserror::Error;

/// Result type alias using Hostpanel's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Hostpanel error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Plugin '{0}' not found. Run `hostpanel plugins list` to see installed plugins.")]
    PluginNotFound(String),

    #[error("Theme '{0}' not found. Run `hostpanel themes list` to see installed themes.")]
    ThemeNotFound(String),

    // Storage errors (E400-E499)
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Filesystem operation '{operation}' failed for {path}: {source}")]
    FilesystemError {
        operation: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid version '{0}': expected a semantic version such as 1.2.0")]
    InvalidVersion(String),

    #[error("Invalid version constraint '{0}'")]
    InvalidConstraint(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an I/O error with the filesystem operation and path it came from
    pub fn filesystem(
        operation: &'static str,
        path: impl AsRef<std::path::Path>,
        source: std::io::Error,
    ) -> Self {
        Self::FilesystemError {
            operation,
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::PluginNotFound(_) => "E001",
            Self::ThemeNotFound(_) => "E002",
            Self::StorageError(_) => "E400",
            Self::FilesystemError { .. } => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::InvalidVersion(_) => "E801",
            Self::InvalidConstraint(_) => "E802",
            Self::Json(_) => "E803",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::PluginNotFound(_) => Some("hostpanel plugins discover".to_string()),
            Self::ThemeNotFound(_) => Some("hostpanel themes list".to_string()),
            Self::ConfigError(_) => Some("hostpanel config list".to_string()),
            Self::FilesystemError { path, .. } => {
                Some(format!("Check permissions and free space for {}", path))
            }
            _ => None,
        }
    }
}
