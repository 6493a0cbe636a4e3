//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::version::parse_version;

/// Hostpanel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub host: HostConfig,
    pub packages: PackagesConfig,
    pub themes: ThemesConfig,
}

/// Project layout. Every directory is derived from the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub project_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Version of the running host application, checked against manifest ranges
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    pub installer: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemesConfig {
    pub default_theme: String,
    pub panel: String,
    pub landing: String,
    pub email: String,
    pub max_upload_mb: u64,
    pub max_extracted_mb: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            installer: "composer".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for ThemesConfig {
    fn default() -> Self {
        Self {
            default_theme: "default".to_string(),
            panel: "default".to_string(),
            landing: "default".to_string(),
            email: "default".to_string(),
            max_upload_mb: 50,
            max_extracted_mb: 100,
        }
    }
}

impl PathsConfig {
    /// Project root; `HOSTPANEL_PROJECT_DIR` takes precedence over the stored value
    pub fn root(&self) -> PathBuf {
        match env::var("HOSTPANEL_PROJECT_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.project_dir.clone(),
        }
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root().join("plugins")
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.root().join("themes")
    }

    /// Public assets of themes (`public/assets/theme/{name}`)
    pub fn theme_assets_dir(&self) -> PathBuf {
        self.root().join("public").join("assets").join("theme")
    }

    /// Public assets published by plugins (`public/plugins/{name}`)
    pub fn plugin_assets_dir(&self) -> PathBuf {
        self.root().join("public").join("plugins")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root().join("var").join("tmp")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join("var").join("cache")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("var").join("data")
    }
}

impl ThemesConfig {
    /// Theme configured for a context (`panel`, `landing`, `email`)
    pub fn theme_for_context(&self, context: &str) -> Option<&str> {
        match context {
            "panel" => Some(&self.panel),
            "landing" => Some(&self.landing),
            "email" => Some(&self.email),
            _ => None,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn max_extracted_bytes(&self) -> u64 {
        self.max_extracted_mb * 1024 * 1024
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("HOSTPANEL_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("hostpanel")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.host_version()?;

        if self.packages.installer.trim().is_empty() {
            return Err(anyhow!("packages.installer must not be empty"));
        }
        if self.packages.timeout_secs == 0 {
            return Err(anyhow!("packages.timeout_secs must be greater than zero"));
        }
        for (key, value) in [
            ("themes.default_theme", &self.themes.default_theme),
            ("themes.panel", &self.themes.panel),
            ("themes.landing", &self.themes.landing),
            ("themes.email", &self.themes.email),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", key));
            }
        }
        if self.themes.max_upload_mb == 0 || self.themes.max_extracted_mb == 0 {
            return Err(anyhow!("Theme upload limits must be greater than zero"));
        }
        Ok(())
    }

    /// Parsed host version
    pub fn host_version(&self) -> anyhow::Result<semver::Version> {
        parse_version(&self.host.version)
            .with_context(|| format!("Invalid host.version: {}", self.host.version))
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "paths.project_dir" => Ok(self.paths.project_dir.display().to_string()),
            "host.version" => Ok(self.host.version.clone()),
            "packages.installer" => Ok(self.packages.installer.clone()),
            "packages.timeout_secs" => Ok(self.packages.timeout_secs.to_string()),
            "themes.default_theme" => Ok(self.themes.default_theme.clone()),
            "themes.panel" => Ok(self.themes.panel.clone()),
            "themes.landing" => Ok(self.themes.landing.clone()),
            "themes.email" => Ok(self.themes.email.clone()),
            "themes.max_upload_mb" => Ok(self.themes.max_upload_mb.to_string()),
            "themes.max_extracted_mb" => Ok(self.themes.max_extracted_mb.to_string()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `hostpanel config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "paths.project_dir" => {
                self.paths.project_dir = PathBuf::from(value);
            }
            "host.version" => {
                parse_version(value).with_context(|| format!("Invalid host version: {}", value))?;
                self.host.version = value.to_string();
            }
            "packages.installer" => {
                self.packages.installer = value.to_string();
            }
            "packages.timeout_secs" => {
                self.packages.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "themes.default_theme" => self.themes.default_theme = value.to_string(),
            "themes.panel" => self.themes.panel = value.to_string(),
            "themes.landing" => self.themes.landing = value.to_string(),
            "themes.email" => self.themes.email = value.to_string(),
            "themes.max_upload_mb" => {
                self.themes.max_upload_mb = value
                    .parse()
                    .with_context(|| format!("Invalid max_upload_mb value: {}", value))?;
            }
            "themes.max_extracted_mb" => {
                self.themes.max_extracted_mb = value
                    .parse()
                    .with_context(|| format!("Invalid max_extracted_mb value: {}", value))?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `hostpanel config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "paths.project_dir",
            "host.version",
            "packages.installer",
            "packages.timeout_secs",
            "themes.default_theme",
            "themes.panel",
            "themes.landing",
            "themes.email",
            "themes.max_upload_mb",
            "themes.max_extracted_mb",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}
