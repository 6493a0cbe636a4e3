//! Package-level (composer) dependencies of plugins
//!
//! A plugin needs installation when its `composer.json` requires anything
//! besides the PHP runtime and extensions. Installation shells out to the
//! configured installer with a bounded timeout.
//!
//! The installer binary is looked up in order: `HOSTPANEL_COMPOSER_BINARY`,
//! the configured command on `PATH`, then common install locations.

use std::env;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use hostpanel_core::fs::{Filesystem, LocalFilesystem};
use wait_timeout::ChildExt;

use crate::entity::Plugin;
use crate::{PluginError, PluginResult};

pub const COMPOSER_FILE: &str = "composer.json";
pub const LOCK_FILE: &str = "composer.lock";
pub const COMPOSER_BINARY_ENV: &str = "HOSTPANEL_COMPOSER_BINARY";
const MAX_ERROR_OUTPUT: usize = 500;

const COMMON_COMPOSER_PATHS: &[&str] = &[
    "/usr/bin/composer",
    "/usr/local/bin/composer",
    "/opt/homebrew/bin/composer",
    "/bin/composer",
    "/mnt/c/ProgramData/ComposerSetup/bin/composer",
];

/// Captured installer output
#[derive(Debug, Clone, Default)]
pub struct InstallOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

pub trait PackageInstaller: Send + Sync {
    /// Whether the plugin declares package dependencies
    fn requires_dependencies(&self, plugin: &Plugin) -> PluginResult<bool>;

    fn has_lock_file(&self, plugin: &Plugin) -> bool;

    /// Whether dependencies are already installed in the plugin directory
    fn is_installed(&self, plugin: &Plugin) -> bool;

    /// Install dependencies, removing any previous install first when `clean` is set
    fn install(&self, plugin: &Plugin, clean: bool) -> PluginResult<InstallOutput>;
}

/// Runs `composer install` inside the plugin directory
#[derive(Debug, Clone)]
pub struct ComposerInstaller {
    /// Program plus leading arguments, e.g. `composer` or `php /opt/composer.phar`
    command: Vec<String>,
    timeout: Duration,
}

impl ComposerInstaller {
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.split_whitespace().map(str::to_string).collect(),
            timeout,
        }
    }

    /// Like [`Self::new`], with the program resolved to an executable path
    pub fn resolved(configured: &str, timeout: Duration) -> Self {
        let override_binary = env::var(COMPOSER_BINARY_ENV).ok();
        let command = resolve_command(override_binary.as_deref(), configured, COMMON_COMPOSER_PATHS);
        tracing::debug!(configured, resolved = %command, "Resolved package installer");
        Self::new(&command, timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn run(&self, plugin: &Plugin) -> PluginResult<InstallOutput> {
        let (program, prefix) = self.command.split_first().ok_or_else(|| PluginError::PackageInstall {
            plugin: plugin.name.clone(),
            output: "no installer command configured".to_string(),
        })?;

        let started = Instant::now();
        let mut child = Command::new(program)
            .args(prefix)
            .arg("install")
            .arg("--no-dev")
            .arg("--no-interaction")
            .arg("--no-progress")
            .arg("--optimize-autoloader")
            .arg(format!("--working-dir={}", plugin.path.display()))
            .current_dir(&plugin.path)
            .env("COMPOSER_NO_INTERACTION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PluginError::PackageInstall {
                plugin: plugin.name.clone(),
                output: format!("failed to start '{}': {}", program, e),
            })?;

        // Drain pipes on separate threads so a chatty installer cannot block on a full pipe
        let stdout_reader = child.stdout.take().map(|mut out| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut err| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf);
                buf
            })
        });

        let status = child.wait_timeout(self.timeout)?;
        let Some(status) = status else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PluginError::PackageInstall {
                plugin: plugin.name.clone(),
                output: format!("installation timed out after {} seconds", self.timeout.as_secs()),
            });
        };

        let collect = |reader: Option<thread::JoinHandle<Vec<u8>>>| {
            reader
                .and_then(|handle| handle.join().ok())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default()
        };
        let output = InstallOutput {
            stdout: collect(stdout_reader),
            stderr: collect(stderr_reader),
            duration: started.elapsed(),
        };

        if !status.success() {
            let detail = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            return Err(PluginError::PackageInstall {
                plugin: plugin.name.clone(),
                output: truncate(detail.trim(), MAX_ERROR_OUTPUT),
            });
        }

        Ok(output)
    }
}

impl PackageInstaller for ComposerInstaller {
    fn requires_dependencies(&self, plugin: &Plugin) -> PluginResult<bool> {
        let path = plugin.path.join(COMPOSER_FILE);
        if !path.exists() {
            return Ok(false);
        }

        let data = fs::read_to_string(&path)?;
        let json: serde_json::Value = serde_json::from_str(&data).map_err(|e| PluginError::PackageInstall {
            plugin: plugin.name.clone(),
            output: format!("invalid {}: {}", COMPOSER_FILE, e),
        })?;

        Ok(json
            .get("require")
            .and_then(|r| r.as_object())
            .is_some_and(|require| require.keys().any(|name| is_package(name))))
    }

    fn has_lock_file(&self, plugin: &Plugin) -> bool {
        plugin.path.join(LOCK_FILE).is_file()
    }

    fn is_installed(&self, plugin: &Plugin) -> bool {
        vendor_dir(&plugin.path).join("autoload.php").is_file()
    }

    fn install(&self, plugin: &Plugin, clean: bool) -> PluginResult<InstallOutput> {
        if clean {
            LocalFilesystem::new().remove(&vendor_dir(&plugin.path))?;
        }

        tracing::info!(plugin = %plugin.name, timeout_secs = self.timeout.as_secs(), "Installing plugin dependencies");
        let output = self.run(plugin)?;
        tracing::info!(
            plugin = %plugin.name,
            duration_ms = output.duration.as_millis() as u64,
            "Plugin dependencies installed"
        );
        Ok(output)
    }
}

/// Pick the installer command line
///
/// An executable override wins outright. Otherwise the configured program is
/// looked up (keeping its arguments), then each common location. Nothing
/// found leaves the configured command as is.
fn resolve_command(override_binary: Option<&str>, configured: &str, common_paths: &[&str]) -> String {
    if let Some(binary) = override_binary.filter(|b| which::which(b).is_ok()) {
        return binary.to_string();
    }

    let mut parts = configured.split_whitespace();
    let Some(program) = parts.next() else {
        return configured.to_string();
    };
    let args: Vec<&str> = parts.collect();
    let with_args = |program: &str| {
        std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ")
    };

    if let Ok(found) = which::which(program) {
        return with_args(&*found.to_string_lossy());
    }
    common_paths
        .iter()
        .find(|path| which::which(path).is_ok())
        .map(|path| with_args(*path))
        .unwrap_or_else(|| configured.to_string())
}

fn vendor_dir(plugin_dir: &Path) -> std::path::PathBuf {
    plugin_dir.join("vendor")
}

/// Platform requirements are provided by the host, not installed
fn is_package(name: &str) -> bool {
    name != "php" && !name.starts_with("ext-")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
