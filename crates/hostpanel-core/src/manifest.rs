//! Rules shared by plugin and theme manifest validation
//!
//! Validators accumulate human-readable messages instead of failing on the
//! first problem, so an operator sees every issue in one pass.

use regex::Regex;
use semver::Version;

use crate::version::parse_version;

/// Accumulates manifest validation errors
#[derive(Debug, Default, Clone)]
pub struct FieldErrors {
    errors: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Field must be present and non-blank. Returns the trimmed value when it is.
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                self.push(format!("Field '{}' is required", field));
                None
            }
        }
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        let len = value.chars().count();
        if len > max {
            self.push(format!(
                "Field '{}' must be at most {} characters (got {})",
                field, max, len
            ));
        }
    }

    pub fn matches(&mut self, field: &str, value: &str, pattern: &str, hint: &str) {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(value) => {}
            Ok(_) => self.push(format!("Field '{}' is invalid: {}", field, hint)),
            Err(e) => self.push(format!("Field '{}' could not be checked: {}", field, e)),
        }
    }

    /// Invalid format is recorded, never raised
    pub fn semver(&mut self, field: &str, value: &str) -> Option<Version> {
        match parse_version(value) {
            Ok(v) => Some(v),
            Err(_) => {
                self.push(format!(
                    "Field '{}' must be a valid semantic version (got '{}')",
                    field, value
                ));
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.errors
    }
}

/// Check that `host` lies within the declared `[min, max]` range
///
/// Either bound may be absent. Unparseable bounds count as incompatible.
pub fn check_host_range(
    host: &Version,
    min: Option<&str>,
    max: Option<&str>,
) -> std::result::Result<(), String> {
    let describe = || match (min, max) {
        (Some(lo), Some(hi)) => format!(">={} <={}", lo, hi),
        (Some(lo), None) => format!(">={}", lo),
        (None, Some(hi)) => format!("<={}", hi),
        (None, None) => "*".to_string(),
    };

    if let Some(lo) = min {
        let lo_v = parse_version(lo).map_err(|_| format!("Invalid minimum host version '{}'", lo))?;
        if *host < lo_v {
            return Err(format!(
                "Requires host version {}, current version is {}",
                describe(),
                host
            ));
        }
    }
    if let Some(hi) = max {
        let hi_v = parse_version(hi).map_err(|_| format!("Invalid maximum host version '{}'", hi))?;
        if *host > hi_v {
            return Err(format!(
                "Requires host version {}, current version is {}",
                describe(),
                host
            ));
        }
    }
    Ok(())
}

/// Soft warning when a manifest targets an older host version than the running one
pub fn outdated_target_warning(host: &Version, target: &str) -> Option<String> {
    let target_v = parse_version(target).ok()?;
    (target_v < *host).then(|| {
        format!(
            "Built for host version {}, current version is {}. Some features may not work as expected.",
            target, host
        )
    })
}
