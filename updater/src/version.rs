//! 시맨틱 버전 비교 (installed build vs. latest release)

use std::cmp::Ordering;
use std::fmt;

/// `major.minor[.patch][-prerelease][+build]`, tolerant of a leading `v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl SemVer {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix('v').unwrap_or(raw);
        // build metadata never participates in ordering
        let raw = raw.split_once('+').map_or(raw, |(core, _)| core);
        let (core, prerelease) = match raw.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some((core, _)) => (core, None),
            None => (raw, None),
        };

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self { major, minor, patch, prerelease })
    }

    pub fn is_newer_than(&self, other: &SemVer) -> bool {
        self > other
    }
}

/// Whether `remote` should replace `local`. A missing or unparsable local
/// build always counts as outdated; an unparsable remote never does.
pub fn is_update_available(local: Option<&str>, remote: &str) -> bool {
    let Some(remote) = SemVer::parse(remote) else {
        return false;
    };
    match local.and_then(SemVer::parse) {
        Some(local) => remote.is_newer_than(&local),
        None => true,
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_and_short_versions() {
        let v = SemVer::parse("v1.9.2").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 9, 2));

        let short = SemVer::parse("1.8").unwrap();
        assert_eq!(short.patch, 0);

        let dev = SemVer::parse("1.10.0-dev.42+sha.abc").unwrap();
        assert_eq!(dev.prerelease.as_deref(), Some("dev.42"));
        assert_eq!(dev.to_string(), "1.10.0-dev.42");

        assert!(SemVer::parse("latest").is_none());
        assert!(SemVer::parse("1.2.3.4").is_none());
    }

    #[test]
    fn ordering_respects_prerelease() {
        let rel = SemVer::parse("1.10.0").unwrap();
        let pre = SemVer::parse("1.10.0-dev.1").unwrap();
        let old = SemVer::parse("1.9.9").unwrap();
        assert!(rel.is_newer_than(&pre));
        assert!(pre.is_newer_than(&old));
    }

    #[test]
    fn update_available_decisions() {
        assert!(is_update_available(None, "1.9.0"));
        assert!(is_update_available(Some(""), "1.9.0"));
        assert!(is_update_available(Some("1.8.4"), "1.9.0"));
        assert!(!is_update_available(Some("1.9.0"), "1.9.0"));
        assert!(!is_update_available(Some("2.0.0"), "1.9.0"));
        assert!(!is_update_available(Some("1.0.0"), "nightly"));
    }
}
