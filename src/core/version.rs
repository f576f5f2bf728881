//! Dotted numeric versions for OS and compiler comparisons.
//!
//! Host versions (`10.9`, `4.8.5`, `15.0.0`) are not semver, so they get a
//! small dedicated type: numeric components compared left to right, with
//! missing trailing components treated as zero (`10.9 == 10.9.0`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A version made of dot-separated unsigned integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DottedVersion {
    parts: Vec<u64>,
}

/// Error parsing a dotted version.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version `{0}`: expected dot-separated numbers like `10.9` or `4.8.5`")]
pub struct VersionParseError(pub String);

impl DottedVersion {
    pub fn new(parts: impl Into<Vec<u64>>) -> Self {
        DottedVersion {
            parts: parts.into(),
        }
    }

    /// Numeric components as written.
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// Whether `prefix` names this version's series.
    ///
    /// `4.8` covers `4.8`, `4.8.0` and `4.8.5` but not `4.9`; `6` covers
    /// every `6.x`.
    pub fn starts_with(&self, prefix: &DottedVersion) -> bool {
        prefix
            .parts
            .iter()
            .enumerate()
            .all(|(i, p)| self.parts.get(i).copied().unwrap_or(0) == *p)
    }

    fn trimmed(&self) -> &[u64] {
        let len = self
            .parts
            .iter()
            .rposition(|p| *p != 0)
            .map_or(0, |i| i + 1);
        &self.parts[..len]
    }
}

impl FromStr for DottedVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError(s.to_string()));
        }

        trimmed
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map(DottedVersion::new)
            .map_err(|_| VersionParseError(s.to_string()))
    }
}

impl TryFrom<String> for DottedVersion {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DottedVersion> for String {
    fn from(v: DottedVersion) -> String {
        v.to_string()
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

impl Hash for DottedVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trimmed().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> DottedVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(v("10.9").parts(), &[10, 9]);
        assert_eq!(v("4.8.5").to_string(), "4.8.5");
        assert!("".parse::<DottedVersion>().is_err());
        assert!("4.x".parse::<DottedVersion>().is_err());
        assert!("mavericks".parse::<DottedVersion>().is_err());
    }

    #[test]
    fn test_ordering_pads_with_zero() {
        assert_eq!(v("10.9"), v("10.9.0"));
        assert!(v("10.8.5") < v("10.9"));
        assert!(v("10.10") > v("10.9"));
        assert!(v("5") > v("4.9.3"));
    }

    #[test]
    fn test_starts_with() {
        assert!(v("4.8.5").starts_with(&v("4.8")));
        assert!(v("4.8").starts_with(&v("4.8")));
        assert!(!v("4.9.1").starts_with(&v("4.8")));
        assert!(v("6.3.0").starts_with(&v("6")));
        assert!(!v("16.1").starts_with(&v("6")));
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("10.9"));
        assert!(set.contains(&v("10.9.0")));
    }
}
