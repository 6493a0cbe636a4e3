//! Hostpanel Theme System
//!
//! Themes live on disk only: `themes/{name}/` holds templates and
//! `template.json`, `public/assets/theme/{name}/` holds static assets.
//!
//! - [`upload::ThemeUploadService`] ingests a ZIP archive end-to-end with rollback
//! - [`upgrade::ThemeUpgradeService`] migrates legacy themes to the context layout
//! - [`catalog::ThemeCatalog`], [`copy::ThemeCopyService`] and
//!   [`export::ThemeExportService`] cover day-to-day management

pub mod archive;
pub mod catalog;
pub mod copy;
pub mod events;
pub mod export;
pub mod manifest;
pub mod security;
pub mod structure;
pub mod upgrade;
pub mod upload;
pub mod validator;

#[cfg(test)]
mod test_support;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use hostpanel_core::config::PathsConfig;
use thiserror::Error;

pub use catalog::{Theme, ThemeCatalog};
pub use events::{ThemeEvent, ThemeEventType};
pub use manifest::TemplateManifest;
pub use upgrade::{ThemeUpgradeService, UpgradeReport};
pub use upload::{ThemeUploadResult, ThemeUploadService};

#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("Invalid file type. Expected ZIP, got {0}")]
    InvalidFileType(String),

    #[error("File too large ({:.1} MB). Maximum allowed: {:.1} MB", megabytes(.size), megabytes(.max))]
    FileTooLarge { size: u64, max: u64 },

    #[error("Only .zip files are allowed, got '{0}'")]
    InvalidExtension(String),

    #[error("The file is not a valid ZIP archive: {0}")]
    InvalidZip(String),

    #[error("Extracted size ({:.1} MB) exceeds maximum allowed ({:.1} MB)", megabytes(.total), megabytes(.max))]
    ZipBomb { total: u64, max: u64 },

    #[error("Dangerous path detected in archive: {0}")]
    MaliciousPath(String),

    #[error("Symbolic link detected in archive: {0}")]
    Symlink(String),

    #[error("{message}{}", details_suffix(.errors))]
    InvalidManifest { message: String, errors: Vec<String> },

    #[error("{message}{}", details_suffix(.errors))]
    InvalidStructure { message: String, errors: Vec<String> },

    #[error("Theme '{0}' already exists. Delete it first to upload a new version.")]
    AlreadyExists(String),

    #[error("Critical security issues detected{}", warnings_suffix(.warnings))]
    Security { warnings: Vec<ThemeWarning> },

    #[error("Theme '{0}' does not exist or has no readable template.json")]
    NotFound(String),


    #[error("Default theme {what} not found at {path}")]
    MissingDefault { what: &'static str, path: String },

    #[error("Upgrade of theme '{theme}' failed: {source}")]
    Upgrade {
        theme: String,
        #[source]
        source: Box<ThemeError>,
    },

    #[error("Invalid theme name '{name}'{}", details_suffix(.errors))]
    InvalidName { name: String, errors: Vec<String> },

    #[error(transparent)]
    Core(#[from] hostpanel_core::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Theme IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ThemeError {
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFileType(_) => "E701",
            Self::FileTooLarge { .. } => "E702",
            Self::InvalidExtension(_) => "E703",
            Self::InvalidZip(_) | Self::Zip(_) => "E704",
            Self::ZipBomb { .. } => "E705",
            Self::MaliciousPath(_) => "E706",
            Self::Symlink(_) => "E707",
            Self::InvalidManifest { .. } => "E708",
            Self::InvalidStructure { .. } => "E709",
            Self::AlreadyExists(_) => "E710",
            Self::Security { .. } => "E711",
            Self::NotFound(_) => "E712",
            Self::MissingDefault { .. } => "E714",
            Self::Upgrade { .. } => "E715",
            Self::InvalidName { .. } => "E716",
            Self::Core(inner) => inner.code(),
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::AlreadyExists(name) => Some(format!(
                "Remove themes/{name} and public/assets/theme/{name} before uploading again"
            )),
            Self::NotFound(_) => Some("hostpanel themes list".to_string()),
            Self::MissingDefault { .. } => {
                Some("Restore the built-in default theme, then retry the upgrade".to_string())
            }
            Self::Upgrade { theme, .. } => Some(format!("hostpanel themes upgrade {}", theme)),
            Self::Core(inner) => inner.suggestion(),
            _ => None,
        }
    }
}

pub type ThemeResult<T> = Result<T, ThemeError>;

fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / 1024.0 / 1024.0
}

fn details_suffix(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(": {}", errors.join("; "))
    }
}

fn warnings_suffix(warnings: &[ThemeWarning]) -> String {
    let messages: Vec<String> = warnings.iter().map(|w| w.message.clone()).collect();
    details_suffix(&messages)
}

/// How serious an upload finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Needs operator confirmation
    Warning,
    /// Always blocks installation
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    OutdatedHostVersion,
    MissingAssets,
    MissingTranslation,
    RawFilter,
    DynamicInclude,
    DangerousFile,
    InvalidAssetType,
    ScanError,
}

/// A non-fatal (or, when critical, blocking) upload finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeWarning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl ThemeWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl fmt::Display for ThemeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(file) = self.details.get("file") {
            write!(f, " ({}", file)?;
            if let Some(line) = self.details.get("line") {
                write!(f, ":{}", line)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Where installed themes and their assets live
#[derive(Debug, Clone)]
pub struct ThemeDirs {
    pub themes_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl ThemeDirs {
    pub fn new(themes_dir: impl Into<PathBuf>, assets_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            themes_dir: themes_dir.into(),
            assets_dir: assets_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Standard layout under a project root
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("themes"),
            root.join("public").join("assets").join("theme"),
            root.join("var").join("tmp"),
        )
    }

    pub fn theme_path(&self, name: &str) -> PathBuf {
        self.themes_dir.join(name)
    }

    pub fn assets_path(&self, name: &str) -> PathBuf {
        self.assets_dir.join(name)
    }
}

impl From<&PathsConfig> for ThemeDirs {
    fn from(paths: &PathsConfig) -> Self {
        Self::new(paths.themes_dir(), paths.theme_assets_dir(), paths.temp_dir())
    }
}
