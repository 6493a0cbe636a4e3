//! Static security scanning of plugin sources

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::entity::Plugin;
use crate::{PluginError, PluginResult};

/// Executable or binary payloads never belong in a plugin
const FORBIDDEN_EXTENSIONS: &[&str] = &["exe", "dll", "so", "sh", "bat", "cmd", "phar"];
/// Source files whose contents are inspected
const SCANNED_EXTENSIONS: &[&str] = &["php", "inc", "phtml", "js", "twig"];
/// Third-party and VCS trees are not plugin code
const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", ".git"];
const MAX_SCANNED_BYTES: u64 = 1024 * 1024;

const CRITICAL_CALLS: &str = r"\beval\s*\(";
const PROCESS_CALLS: &str = r"\b(shell_exec|exec|system|passthru|proc_open|popen|pcntl_exec)\s*\(";
const RISKY_CALLS: &str = r"\b(unserialize|base64_decode)\s*\(";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityIssue {
    pub severity: IssueSeverity,
    /// Path relative to the plugin directory
    pub file: String,
    pub message: String,
}

impl fmt::Display for SecurityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.file, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityReport {
    pub issues: Vec<SecurityIssue>,
}

impl SecurityReport {
    pub fn with_severity(&self, severity: IssueSeverity) -> Vec<&SecurityIssue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Critical)
    }

    /// Critical issues joined into a single fault reason
    pub fn critical_summary(&self) -> String {
        self.with_severity(IssueSeverity::Critical)
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Scans a plugin before it is enabled
pub trait SecurityScanner: Send + Sync {
    fn scan(&self, plugin: &Plugin) -> PluginResult<SecurityReport>;
}

/// Pattern-based scanner over the plugin directory
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticSecurityScanner;

impl StaticSecurityScanner {
    pub fn new() -> Self {
        Self
    }

    fn scan_dir(&self, root: &Path) -> PluginResult<SecurityReport> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PluginError::Core(hostpanel_core::Error::Other(e.to_string())))
        };
        let rules = [
            (compile(CRITICAL_CALLS)?, IssueSeverity::Critical, "dynamic code evaluation"),
            (compile(PROCESS_CALLS)?, IssueSeverity::High, "process execution"),
            (compile(RISKY_CALLS)?, IssueSeverity::Medium, "unsafe deserialization or decoding"),
        ];

        let mut report = SecurityReport::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0 || !SKIPPED_DIRS.iter().any(|skipped| name == *skipped)
            });

        for entry in walker {
            let entry = entry.map_err(|e| PluginError::IoError(std::io::Error::other(e.to_string())))?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .display()
                .to_string();

            if entry.path_is_symlink() {
                report.issues.push(SecurityIssue {
                    severity: IssueSeverity::High,
                    file: relative,
                    message: "symbolic link inside plugin directory".to_string(),
                });
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let extension = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            if FORBIDDEN_EXTENSIONS.contains(&extension.as_str()) {
                report.issues.push(SecurityIssue {
                    severity: IssueSeverity::Critical,
                    file: relative,
                    message: format!("executable file type '.{}'", extension),
                });
                continue;
            }
            if !SCANNED_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_SCANNED_BYTES).unwrap_or(true) {
                tracing::debug!(file = %relative, "Skipping oversized file during security scan");
                continue;
            }

            let contents = fs::read(entry.path())?;
            let text = String::from_utf8_lossy(&contents);
            for (pattern, severity, label) in &rules {
                if let Some(found) = pattern.find(&text) {
                    let line = text[..found.start()].matches('\n').count() + 1;
                    report.issues.push(SecurityIssue {
                        severity: *severity,
                        file: relative.clone(),
                        message: format!("{} (`{}` on line {})", label, found.as_str().trim_end_matches('('), line),
                    });
                }
            }
        }

        Ok(report)
    }
}

impl SecurityScanner for StaticSecurityScanner {
    fn scan(&self, plugin: &Plugin) -> PluginResult<SecurityReport> {
        if !plugin.path.is_dir() {
            return Err(PluginError::runtime(
                &plugin.name,
                format!("plugin directory {} does not exist", plugin.path.display()),
            ));
        }
        let report = self.scan_dir(&plugin.path)?;
        tracing::debug!(plugin = %plugin.name, issues = report.issues.len(), "Security scan finished");
        Ok(report)
    }
}
