// src/version.rs

//! Version parsing and comparison
//!
//! Aurora versions are dotted sequences of non-negative integers
//! ("1", "1.0", "2.14.3"). Comparison pads the shorter side with zeros and
//! compares component-wise. Anything non-numeric is rejected at parse time.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed dotted-integer version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Parse a dotted-integer version string
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidVersion(s.to_string()));
        }
        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| Error::InvalidVersion(s.to_string()))
            })
            .collect::<Result<Vec<u64>>>()?;
        Ok(Self { components })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Compare two version strings, parsing both.
///
/// Returns `Ordering::Greater` when `a` is newer than `b`.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v.components(), &[1, 2, 3]);
    }

    #[test]
    fn test_parse_single_component() {
        let v = Version::parse("7").unwrap();
        assert_eq!(v.components(), &[7]);
    }

    #[test]
    fn test_parse_rejects_suffixes() {
        assert!(Version::parse("1.0-beta").is_err());
        assert!(Version::parse("1.0.rc1").is_err());
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1..2").is_err());
    }

    #[test]
    fn test_compare_basic() {
        assert_eq!(compare("1.0", "1.1").unwrap(), Ordering::Less);
        assert_eq!(compare("2.0", "1.9").unwrap(), Ordering::Greater);
        assert_eq!(compare("1.2.3", "1.2.3").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_compare_pads_with_zeros() {
        assert_eq!(compare("1.0", "1").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.0.1", "1").unwrap(), Ordering::Greater);
        assert_eq!(compare("1", "1.0.0.1").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_compare_numeric_not_lexicographic() {
        assert_eq!(compare("1.10", "1.9").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(Version::parse("10.0.2").unwrap().to_string(), "10.0.2");
    }
}
