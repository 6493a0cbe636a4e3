//! Static scan of theme templates and assets
//!
//! Twig templates are checked line by line for output-escaping bypasses
//! (`|raw`) and includes whose target is not a string literal. Executable
//! files anywhere in the theme or its assets are critical.

use std::fs;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::{Severity, ThemeWarning, WarningKind};

pub const DANGEROUS_EXTENSIONS: &[&str] = &["php", "phar", "exe", "sh", "bat", "cmd", "com"];

pub const ALLOWED_ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "woff", "woff2", "ttf", "eot", "otf", "svg", "png", "jpg", "jpeg", "gif", "webp",
    "ico",
];

const RAW_FILTER: &str = r"\|\s*raw\b";
const INCLUDE_TAG: &str = r"\{%-?\s*include\s+(\S).*%\}";

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn scan_error(what: &str, error: impl std::fmt::Display) -> ThemeWarning {
    ThemeWarning::new(
        WarningKind::ScanError,
        Severity::Warning,
        format!("Failed to scan {}: {}", what, error),
    )
}

fn dangerous_file(location: &str, root: &Path, path: &Path) -> ThemeWarning {
    ThemeWarning::new(
        WarningKind::DangerousFile,
        Severity::Critical,
        format!("Executable file found in {}: {}", location, file_name(path)),
    )
    .with_detail("file", relative(root, path))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThemeSecurityValidator;

impl ThemeSecurityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Scan Twig templates and look for executables under a theme directory
    pub fn scan_theme(&self, theme_root: &Path) -> Vec<ThemeWarning> {
        let mut warnings = Vec::new();
        let patterns = match (Regex::new(RAW_FILTER), Regex::new(INCLUDE_TAG)) {
            (Ok(raw), Ok(include)) => Some((raw, include)),
            (Err(e), _) | (_, Err(e)) => {
                warnings.push(scan_error("templates", e));
                None
            }
        };

        for entry in WalkDir::new(theme_root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(scan_error("theme directory", e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = extension(path);

            if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
                warnings.push(dangerous_file("theme", theme_root, path));
            } else if ext == "twig" {
                if let Some((raw, include)) = &patterns {
                    warnings.extend(scan_template(theme_root, path, raw, include));
                }
            }
        }

        tracing::debug!(path = %theme_root.display(), findings = warnings.len(), "Scanned theme templates");
        warnings
    }

    /// Flag executables (critical) and anything outside the static asset allow-list
    pub fn scan_assets(&self, assets_root: &Path) -> Vec<ThemeWarning> {
        let mut warnings = Vec::new();

        for entry in WalkDir::new(assets_root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(scan_error("assets directory", e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = extension(path);

            if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
                warnings.push(dangerous_file("assets", assets_root, path));
            } else if !ALLOWED_ASSET_EXTENSIONS.contains(&ext.as_str()) {
                warnings.push(
                    ThemeWarning::new(
                        WarningKind::InvalidAssetType,
                        Severity::Warning,
                        format!("Unusual file type in assets: {}", file_name(path)),
                    )
                    .with_detail("file", relative(assets_root, path))
                    .with_detail("extension", ext),
                );
            }
        }

        tracing::debug!(path = %assets_root.display(), findings = warnings.len(), "Scanned theme assets");
        warnings
    }
}

fn scan_template(root: &Path, path: &Path, raw: &Regex, include: &Regex) -> Vec<ThemeWarning> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return vec![scan_error(&relative(root, path), e)],
    };
    let file = relative(root, path);
    let mut warnings = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let finding = |kind, message: &str| {
            ThemeWarning::new(kind, Severity::Warning, message)
                .with_detail("file", &file)
                .with_detail("line", index + 1)
                .with_detail("code", line.trim())
        };

        if raw.is_match(line) {
            warnings.push(finding(
                WarningKind::RawFilter,
                "Raw filter found in template (bypasses output escaping)",
            ));
        }
        let dynamic = include
            .captures(line)
            .and_then(|caps| caps.get(1))
            .is_some_and(|first| !matches!(first.as_str(), "\"" | "'"));
        if dynamic {
            warnings.push(finding(
                WarningKind::DynamicInclude,
                "Dynamic include with variable path detected",
            ));
        }
    }

    warnings
}
