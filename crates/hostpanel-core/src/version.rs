//! Semantic version parsing and package-style constraint matching
//!
//! Manifests are written by humans, so versions are parsed leniently
//! (`v1.2` is read as `1.2.0`). Constraints follow the conventions used by
//! PHP package manifests: `>=2.0`, `^1.2`, `~1.3`, `1.*`, `*`, `!=1.4.0`,
//! conjunctions separated by spaces or commas, `1.0 - 2.0` ranges and `||`
//! alternatives.

use semver::{Version, VersionReq};

use crate::error::{Error, Result};

/// Parse a version, padding missing minor/patch components with zero
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    Version::parse(&pad_version(stripped)).map_err(|_| Error::InvalidVersion(raw.to_string()))
}

/// Whether `raw` is accepted by [`parse_version`]
pub fn is_valid_version(raw: &str) -> bool {
    parse_version(raw).is_ok()
}

fn pad_version(raw: &str) -> String {
    let split_at = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split_at);
    let parts = core.split('.').count();
    match parts {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => raw.to_string(),
    }
}

#[derive(Debug)]
enum Predicate {
    Req(VersionReq),
    NotEqual(Version),
}

impl Predicate {
    fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Req(req) => req.matches(version),
            Self::NotEqual(other) => version != other,
        }
    }
}

/// Check whether `version` satisfies `constraint`
pub fn satisfies(version: &Version, constraint: &str) -> Result<bool> {
    let alternatives = parse_constraint(constraint)?;
    Ok(alternatives
        .iter()
        .any(|all| all.iter().all(|predicate| predicate.matches(version))))
}

/// Check a raw installed version string against a constraint
pub fn satisfies_str(version: &str, constraint: &str) -> Result<bool> {
    satisfies(&parse_version(version)?, constraint)
}

fn parse_constraint(constraint: &str) -> Result<Vec<Vec<Predicate>>> {
    let invalid = || Error::InvalidConstraint(constraint.to_string());
    let normalized = constraint.replace("||", "|");

    let mut alternatives = Vec::new();
    for alternative in normalized.split('|') {
        let tokens = tokenize(alternative);
        if tokens.is_empty() {
            if normalized.trim().is_empty() {
                alternatives.push(Vec::new());
                continue;
            }
            return Err(invalid());
        }

        let mut predicates = Vec::new();
        let mut index = 0;
        while index < tokens.len() {
            // `1.0 - 2.0` hyphen range
            if index + 2 < tokens.len() && tokens[index + 1] == "-" {
                let lower = parse_version(&tokens[index]).map_err(|_| invalid())?;
                let upper = parse_version(&tokens[index + 2]).map_err(|_| invalid())?;
                predicates.push(comparator(&format!(">={}", lower), constraint)?);
                predicates.push(comparator(&format!("<={}", upper), constraint)?);
                index += 3;
                continue;
            }
            predicates.push(predicate(&tokens[index], constraint)?);
            index += 1;
        }
        alternatives.push(predicates);
    }
    Ok(alternatives)
}

/// Split an alternative into comparator tokens, gluing a bare operator to its version
fn tokenize(alternative: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for raw in alternative.split([',', ' ', '\t']).filter(|t| !t.is_empty()) {
        if raw.chars().all(|c| matches!(c, '<' | '>' | '=' | '!' | '^' | '~')) {
            pending_op = Some(raw.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, raw)),
            None => tokens.push(raw.to_string()),
        }
    }
    tokens
}

fn predicate(token: &str, constraint: &str) -> Result<Predicate> {
    let token = token.split('@').next().unwrap_or(token);
    if token.is_empty() || token == "*" {
        return comparator("*", constraint);
    }

    let op_len = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '!' | '^' | '~'))
        .unwrap_or(token.len());
    let (op, rest) = token.split_at(op_len);
    let rest = rest
        .strip_prefix('v')
        .or_else(|| rest.strip_prefix('V'))
        .unwrap_or(rest);
    let invalid = || Error::InvalidConstraint(constraint.to_string());

    match op {
        "!=" | "<>" => Ok(Predicate::NotEqual(
            parse_version(rest).map_err(|_| invalid())?,
        )),
        "" | "=" | "==" => {
            if rest.split('.').any(|part| matches!(part, "*" | "x" | "X")) {
                comparator(rest, constraint)
            } else {
                let exact = parse_version(rest).map_err(|_| invalid())?;
                comparator(&format!("={}", exact), constraint)
            }
        }
        "~" => {
            // `~1.3` means `>=1.3.0 <2.0.0`; `~1.3.2` keeps semver meaning
            let parts: Vec<&str> = rest.split('.').collect();
            if parts.len() == 2 {
                let lower = parse_version(rest).map_err(|_| invalid())?;
                comparator(
                    &format!(">={}, <{}.0.0", lower, lower.major + 1),
                    constraint,
                )
            } else {
                comparator(&format!("~{}", rest), constraint)
            }
        }
        ">=" | "<=" | ">" | "<" | "^" => comparator(&format!("{}{}", op, rest), constraint),
        _ => Err(invalid()),
    }
}

fn comparator(req: &str, constraint: &str) -> Result<Predicate> {
    VersionReq::parse(req)
        .map(Predicate::Req)
        .map_err(|_| Error::InvalidConstraint(constraint.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        parse_version(raw).unwrap()
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("v3"), Version::new(3, 0, 0));
        assert_eq!(v(" 0.6.2 "), Version::new(0, 6, 2));
        assert_eq!(v("1.0-beta.1").pre.as_str(), "beta.1");
        assert!(parse_version("abc").is_err());
        assert!(parse_version("").is_err());
        assert!(!is_valid_version("1.2.3.4"));
    }

    #[test]
    fn comparison_constraints() {
        assert!(satisfies(&v("2.0.0"), ">=2.0").unwrap());
        assert!(!satisfies(&v("1.5.0"), ">=2.0").unwrap());
        assert!(satisfies(&v("1.5.0"), ">= 1.0 < 2.0").unwrap());
        assert!(satisfies(&v("1.5.0"), ">=1.0,<2.0").unwrap());
        assert!(!satisfies(&v("2.0.0"), ">=1.0 <2.0").unwrap());
    }

    #[test]
    fn caret_tilde_and_wildcards() {
        assert!(satisfies(&v("1.9.0"), "^1.2").unwrap());
        assert!(!satisfies(&v("2.0.0"), "^1.2").unwrap());
        assert!(satisfies(&v("1.9.0"), "~1.3").unwrap());
        assert!(!satisfies(&v("1.4.0"), "~1.3.2").unwrap());
        assert!(satisfies(&v("1.3.7"), "~1.3.2").unwrap());
        assert!(satisfies(&v("4.2.1"), "*").unwrap());
        assert!(satisfies(&v("1.7.0"), "1.*").unwrap());
        assert!(satisfies(&v("4.2.1"), "").unwrap());
    }

    #[test]
    fn exact_alternatives_and_exclusions() {
        assert!(satisfies(&v("1.2.0"), "1.2").unwrap());
        assert!(!satisfies(&v("1.2.1"), "1.2").unwrap());
        assert!(satisfies(&v("3.1.0"), "^1.0 || ^3.0").unwrap());
        assert!(!satisfies(&v("1.4.0"), ">=1.0 !=1.4.0").unwrap());
        assert!(satisfies(&v("1.5.0"), "1.0 - 2.0").unwrap());
        assert!(satisfies(&v("2.0.0"), ">=2.0@stable").unwrap());
    }

    #[test]
    fn malformed_constraints_are_errors() {
        assert!(satisfies(&v("1.0.0"), ">=banana").is_err());
        assert!(satisfies(&v("1.0.0"), "%1.0").is_err());
        assert!(satisfies_str("x.y", ">=1.0").is_err());
    }
}
