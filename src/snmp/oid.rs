//! Object identifier type with lexicographic ordering
//!
//! OIDs are stored canonically as integer component sequences. The dotted
//! string form is only accepted and produced at module boundaries.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// An SNMP object identifier.
///
/// Ordering is component-wise with the shorter OID comparing less when all
/// common components are equal, which is exactly the lexicographic order a
/// MIB walk follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    components: Vec<u32>,
}

impl Oid {
    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns a new OID with `component` appended.
    pub fn append(&self, component: u32) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self::new(components)
    }

    /// Returns a new OID with every component of `suffix` appended.
    pub fn extend(&self, suffix: &[u32]) -> Self {
        let mut components = self.components.clone();
        components.extend_from_slice(suffix);
        Self::new(components)
    }

    /// True when every component of `self` matches the leading components
    /// of `oid`.
    pub fn is_prefix_of(&self, oid: &Oid) -> bool {
        if self.components.len() > oid.components.len() {
            return false;
        }
        self.components[..] == oid.components[..self.components.len()]
    }

    pub fn compare(&self, other: &Oid) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Err(Error::invalid_oid("empty OID string"));
        }

        let mut components = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(Error::invalid_oid(format!("empty component in {s:?}")));
            }
            let component = part
                .parse::<u32>()
                .map_err(|_| Error::invalid_oid(format!("bad component {part:?} in {s:?}")))?;
            components.push(component);
        }

        Ok(Self::new(components))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.components {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

impl From<&[u32]> for Oid {
    fn from(components: &[u32]) -> Self {
        Self::new(components.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(components: [u32; N]) -> Self {
        Self::new(components.to_vec())
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_round_trip() {
        let oid: Oid = "1.3.6.1.2.1.1.1.0".parse().unwrap();
        assert_eq!(oid.components(), &[1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");

        let reparsed: Oid = oid.to_string().parse().unwrap();
        assert_eq!(reparsed, oid);
    }

    #[test]
    fn test_parse_leading_dot() {
        let oid: Oid = ".1.3.6.1".parse().unwrap();
        assert_eq!(oid.components(), &[1, 3, 6, 1]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Oid>().is_err());
        assert!(".".parse::<Oid>().is_err());
        assert!("1..3".parse::<Oid>().is_err());
        assert!("1.x.3".parse::<Oid>().is_err());
        assert!("1.-2.3".parse::<Oid>().is_err());
        // 2^32 does not fit a wire subidentifier
        assert!("1.4294967296".parse::<Oid>().is_err());
    }

    #[test]
    fn test_parse_accepts_max_component() {
        let oid: Oid = "1.4294967295".parse().unwrap();
        assert_eq!(oid.components(), &[1, u32::MAX]);
    }

    #[test]
    fn test_ordering_component_wise() {
        let a: Oid = "1.3.6.1.2.1.1.1".parse().unwrap();
        let b: Oid = "1.3.6.1.2.1.1.2".parse().unwrap();
        assert!(a < b);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_ordering_shorter_is_less() {
        let short: Oid = "1.3.6.1".parse().unwrap();
        let long: Oid = "1.3.6.1.0".parse().unwrap();
        assert!(short < long);
        // but a larger component beats extra length
        let bigger: Oid = "1.3.7".parse().unwrap();
        assert!(long < bigger);
    }

    #[test]
    fn test_is_prefix_of() {
        let system: Oid = "1.3.6.1.2.1.1".parse().unwrap();
        let sys_descr: Oid = "1.3.6.1.2.1.1.1.0".parse().unwrap();
        assert!(system.is_prefix_of(&sys_descr));
        assert!(!sys_descr.is_prefix_of(&system));
        assert!(system.is_prefix_of(&system.clone()));

        let other: Oid = "1.3.6.1.4.1".parse().unwrap();
        assert!(!other.is_prefix_of(&sys_descr));
    }

    #[test]
    fn test_append_and_extend() {
        let base: Oid = "1.3.6.1.2.1.2.2.1".parse().unwrap();
        assert_eq!(base.append(1).to_string(), "1.3.6.1.2.1.2.2.1.1");
        assert_eq!(base.extend(&[2, 1]).to_string(), "1.3.6.1.2.1.2.2.1.2.1");
    }
}
