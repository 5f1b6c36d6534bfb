use std::cmp::Ordering;

use semver::Version;

/// Order two release versions. Versions with fewer than three components are
/// padded with zeros (`1.2` compares as `1.2.0`). Returns `None` when either
/// side is not a recognizable version.
#[must_use]
pub fn compare_versions(left: &str, right: &str) -> Option<Ordering> {
    Some(parse_semver(left)?.cmp(&parse_semver(right)?))
}

fn parse_semver(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);

    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().and_then(|part| part.parse::<u64>().ok());
    let patch = parts.next().and_then(|part| part.parse::<u64>().ok());

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn newer(left: &str, right: &str) -> bool {
        compare_versions(left, right) == Some(Ordering::Greater)
    }

    #[test]
    fn test_version_comparison() {
        assert!(newer("1.0.1", "1.0.0"));
        assert!(newer("0.50.0", "0.49.6"));
        assert!(newer("0.49.10", "0.49.9"));
        assert!(newer("1.2", "1.1.9"));
        assert!(newer("1", "0.99.0"));
        assert!(newer("1.0.0", "1.0.0-beta.2"));
        assert!(newer("v2.0.0", "1.9.9"));
        assert!(!newer("1.0.0", "1.0.0"));
        assert!(!newer("1.2", "1.2.0"));
        assert!(!newer("1.0.0-beta.2", "1.0.0-beta.10"));
        assert!(!newer("0.9.0", "1.0.0"));
    }

    #[test]
    fn equal_versions_compare_equal() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Some(Ordering::Equal));
    }

    #[test]
    fn unrecognized_versions_are_incomparable() {
        assert_eq!(compare_versions("latest", "1.0.0"), None);
        assert_eq!(compare_versions("1.0.0", "1.0.0.0"), None);
        assert_eq!(compare_versions("", "1.0.0"), None);
    }
}
