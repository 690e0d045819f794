use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const SEPARATORS: &[char] = &['.', '_', '-', '+'];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version format {input:?}: {reason}")]
    InvalidFormat { input: String, reason: &'static str },
}

impl VersionError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        VersionError::InvalidFormat {
            input: input.to_string(),
            reason,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Component {
    Numeric(u64),
    Text(String),
}

impl Component {
    fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        match raw.parse::<u64>() {
            Ok(n) => Some(Component::Numeric(n)),
            Err(_) => Some(Component::Text(raw.to_ascii_lowercase())),
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Numeric(a), Component::Numeric(b)) => a.cmp(b),
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
            // qualifiers such as "ea" rank below release numbers
            (Component::Text(_), Component::Numeric(_)) => Ordering::Less,
            (Component::Numeric(_), Component::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A concrete Java version such as `1.8.0_145` or `11.0.2+9`.
///
/// Equality, hashing and ordering work on the parsed components, so
/// `1.8.9 < 1.8.10` and `1.8.05 == 1.8.5`. The original text is kept for display.
#[derive(Clone, Debug)]
pub struct JavaVersion {
    raw: String,
    components: Vec<Component>,
}

impl JavaVersion {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(VersionError::invalid(text, "version is empty"));
        }
        let mut components = Vec::new();
        for part in raw.split(SEPARATORS) {
            match Component::parse(part) {
                Some(component) => components.push(component),
                None if part.is_empty() => {
                    return Err(VersionError::invalid(text, "empty version component"))
                }
                None => {
                    return Err(VersionError::invalid(
                        text,
                        "components must be ASCII letters or digits",
                    ))
                }
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            components,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// True when the leading components of `self` equal every component of `prefix`.
    pub fn starts_with(&self, prefix: &JavaVersion) -> bool {
        self.components.len() >= prefix.components.len()
            && self.components[..prefix.components.len()] == prefix.components[..]
    }
}

impl PartialEq for JavaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for JavaVersion {}

impl Hash for JavaVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl Ord for JavaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl PartialOrd for JavaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for JavaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for JavaVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for JavaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for JavaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        JavaVersion::parse(&raw).map_err(de::Error::custom)
    }
}

/// A requested version constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum VersionSpec {
    /// `*` or `any`
    #[default]
    Any,
    /// `1.8.0_145`
    Exact(JavaVersion),
    /// `1.8*`: any version whose leading components are `1.8`
    Prefix(JavaVersion),
    /// `11+`: the base version or anything newer
    AtLeast(JavaVersion),
}

impl VersionSpec {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(VersionError::invalid(text, "version spec is empty"));
        }
        if trimmed == "*" || trimmed.eq_ignore_ascii_case("any") {
            return Ok(VersionSpec::Any);
        }
        if let Some(base) = trimmed.strip_suffix('*') {
            let base = base.trim_end_matches(['.', '_', '-']);
            if base.is_empty() || base.contains(['*', '+']) {
                return Err(VersionError::invalid(text, "malformed prefix spec"));
            }
            return JavaVersion::parse(base).map(VersionSpec::Prefix);
        }
        if let Some(base) = trimmed.strip_suffix('+') {
            if base.is_empty() || base.contains('*') || base.ends_with(SEPARATORS) {
                return Err(VersionError::invalid(text, "malformed minimum spec"));
            }
            return JavaVersion::parse(base).map(VersionSpec::AtLeast);
        }
        if trimmed.contains('*') {
            return Err(VersionError::invalid(text, "wildcard must be trailing"));
        }
        JavaVersion::parse(trimmed).map(VersionSpec::Exact)
    }

    pub fn matches(&self, candidate: &JavaVersion) -> bool {
        match self {
            VersionSpec::Any => true,
            VersionSpec::Exact(version) => version == candidate,
            VersionSpec::Prefix(prefix) => candidate.starts_with(prefix),
            VersionSpec::AtLeast(base) => candidate >= base,
        }
    }

    fn specificity_key(&self) -> (u8, usize) {
        match self {
            VersionSpec::Exact(v) => (3, v.component_count()),
            VersionSpec::Prefix(v) => (2, v.component_count()),
            VersionSpec::AtLeast(_) => (1, 0),
            VersionSpec::Any => (0, 0),
        }
    }

    /// Orders specs by how narrowly they constrain a version; `Greater` means
    /// `self` is more specific. Exact beats prefix, a longer prefix beats a
    /// shorter one, and `Any` ranks last.
    pub fn compare_specificity(&self, other: &VersionSpec) -> Ordering {
        self.specificity_key().cmp(&other.specificity_key())
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Any => f.write_str("*"),
            VersionSpec::Exact(v) => write!(f, "{v}"),
            VersionSpec::Prefix(v) => write!(f, "{v}*"),
            VersionSpec::AtLeast(v) => write!(f, "{v}+"),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionSpec::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> JavaVersion {
        JavaVersion::parse(text).expect("version parses")
    }

    fn spec(text: &str) -> VersionSpec {
        VersionSpec::parse(text).expect("spec parses")
    }

    #[test]
    fn numeric_components_order_numerically() {
        assert!(v("1.8.9") < v("1.8.10"));
        assert!(v("11.0.1") > v("1.8.225"));
        assert!(v("1.8") < v("1.8.0"));
        assert_eq!(v("1.8.05"), v("1.8.5"));
        assert!(v("11-ea") < v("11-1"));
    }

    #[test]
    fn exact_spec_rejects_other_versions() {
        let exact = spec("1.8.145");
        assert!(exact.matches(&v("1.8.145")));
        assert!(!exact.matches(&v("1.8.146")));
        assert!(!exact.matches(&v("1.8")));
        assert!(!exact.matches(&v("1.8.145.1")));
    }

    #[test]
    fn prefix_spec_compares_leading_components() {
        let prefix = spec("1.8*");
        assert_eq!(prefix, VersionSpec::Prefix(v("1.8")));
        assert!(prefix.matches(&v("1.8.145")));
        assert!(prefix.matches(&v("1.8.0_220")));
        assert!(prefix.matches(&v("1.8")));
        assert!(!prefix.matches(&v("1.80.1")));
        assert!(!prefix.matches(&v("11.0.1")));
        assert!(!prefix.matches(&v("1.7.80")));
        assert_eq!(spec("1.8.*"), prefix);
    }

    #[test]
    fn at_least_and_any_forms() {
        let at_least = spec("11+");
        assert!(at_least.matches(&v("11")));
        assert!(at_least.matches(&v("17.0.2")));
        assert!(!at_least.matches(&v("1.8.145")));
        assert_eq!(spec("*"), VersionSpec::Any);
        assert_eq!(spec("ANY"), VersionSpec::Any);
        assert!(VersionSpec::Any.matches(&v("1.2.3")));
    }

    #[test]
    fn malformed_specs_fail_at_parse_time() {
        for bad in ["", "   ", "1..8", "1.8*.1", "1.8 beta", "*1.8", "1.8.+", "1.8*+", ".*"] {
            assert!(
                matches!(VersionSpec::parse(bad), Err(VersionError::InvalidFormat { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn exact_outranks_prefix_in_specificity() {
        assert_eq!(spec("1.8.145").compare_specificity(&spec("1.8*")), Ordering::Greater);
        assert_eq!(spec("1.8*").compare_specificity(&spec("1*")), Ordering::Greater);
        assert_eq!(spec("11+").compare_specificity(&spec("*")), Ordering::Greater);
        assert_eq!(spec("*").compare_specificity(&spec("1.8*")), Ordering::Less);
    }

    #[test]
    fn display_round_trips_through_serde() {
        let parsed: VersionSpec = serde_json::from_str("\"1.8*\"").expect("deserialize");
        assert_eq!(parsed.to_string(), "1.8*");
        assert_eq!(serde_json::to_string(&v("1.8.0_145")).unwrap(), "\"1.8.0_145\"");
    }
}
