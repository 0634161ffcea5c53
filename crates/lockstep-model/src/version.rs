//! Package versions and version ranges
//!
//! Versions are plain [`semver::Version`]s. Inputs with one or two numeric parts
//! are padded (`1.0` becomes `1.0.0`); four-part versions are rejected.
//!
//! Ranges use interval notation:
//!
//! | input        | meaning                         |
//! |--------------|---------------------------------|
//! | `1.2.3`      | `[1.2.3, )`, minimum inclusive  |
//! | `[1.2.3]`    | exactly 1.2.3                   |
//! | `[1.0, 2.0)` | general interval                |
//! | `1.*`        | floating, `[1.0.0, 2.0.0)`      |
//! | `1.2.3-*`    | 1.2.3 prereleases and above     |

use semver::{Prerelease, Version};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Version string is empty")]
    Empty,

    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid version range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },
}

pub type VersionResult<T> = Result<T, VersionError>;

fn invalid_version(input: &str, reason: impl Into<String>) -> VersionError {
    VersionError::InvalidVersion {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn invalid_range(input: &str, reason: impl Into<String>) -> VersionError {
    VersionError::InvalidRange {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Parse a package version, padding missing minor/patch parts
pub fn parse_version(input: &str) -> VersionResult<Version> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VersionError::Empty);
    }

    let split = trimmed
        .find(|c| c == '-' || c == '+')
        .unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return Err(invalid_version(
            trimmed,
            "at most three numeric parts are allowed",
        ));
    }

    let mut numbers = Vec::with_capacity(3);
    for part in &parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid_version(trimmed, "numeric parts must be digits"));
        }
        let n = part
            .parse::<u64>()
            .map_err(|e| invalid_version(trimmed, e.to_string()))?;
        numbers.push(n);
    }
    numbers.resize(3, 0);

    let normalized = format!("{}.{}.{}{}", numbers[0], numbers[1], numbers[2], suffix);
    Version::parse(&normalized).map_err(|e| invalid_version(trimmed, e.to_string()))
}

/// Which part of a floating range floats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatBehavior {
    /// `*`
    Major,
    /// `1.*`
    Minor,
    /// `1.2.*`
    Patch,
    /// `1.2.3-*` or `1.2.3-beta*`
    Prerelease,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FloatRange {
    behavior: FloatBehavior,
    text: String,
}

/// A version range in interval notation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
    float: Option<FloatRange>,
}

impl VersionRange {
    /// `[version, )`
    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
            float: None,
        }
    }

    /// `[version]`
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
            float: None,
        }
    }

    /// `(, )`, admits every version
    pub fn any() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
            float: None,
        }
    }

    /// Build a general interval; fails when the bounds describe an empty set
    pub fn between(
        min: Option<Version>,
        min_inclusive: bool,
        max: Option<Version>,
        max_inclusive: bool,
    ) -> VersionResult<Self> {
        if let (Some(lo), Some(hi)) = (&min, &max) {
            if lo > hi || (lo == hi && !(min_inclusive && max_inclusive)) {
                return Err(invalid_range(
                    &format!("{}, {}", lo, hi),
                    "minimum is above maximum",
                ));
            }
        }
        Ok(Self {
            min_inclusive: min.is_some() && min_inclusive,
            max_inclusive: max.is_some() && max_inclusive,
            min,
            max,
            float: None,
        })
    }

    /// Parse a central-version table value: a bare version pins exactly
    pub fn parse_pinned(input: &str) -> VersionResult<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with('[') || trimmed.starts_with('(') || trimmed.contains('*') {
            trimmed.parse()
        } else {
            Ok(Self::exact(parse_version(trimmed)?))
        }
    }

    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.min_inclusive
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    pub fn is_float(&self) -> bool {
        self.float.is_some()
    }

    pub fn float_behavior(&self) -> Option<FloatBehavior> {
        self.float.as_ref().map(|f| f.behavior)
    }

    /// The pinned version when this range admits exactly one version
    pub fn exact_version(&self) -> Option<&Version> {
        match (&self.min, &self.max) {
            (Some(lo), Some(hi)) if lo == hi && self.min_inclusive && self.max_inclusive => {
                Some(lo)
            }
            _ => None,
        }
    }

    /// Check whether a version lies inside the range
    pub fn satisfies(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }

    /// True when the range itself names a prerelease, so prereleases rank
    /// equally with stable versions during selection
    pub fn requests_prerelease(&self) -> bool {
        if let Some(float) = &self.float {
            return float.behavior == FloatBehavior::Prerelease;
        }
        self.min.as_ref().is_some_and(|v| !v.pre.is_empty())
            || self.max.as_ref().is_some_and(|v| !v.pre.is_empty())
    }

    /// Highest satisfying version, preferring stable versions unless the
    /// range requests prereleases
    pub fn find_best_match<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let allow_prerelease = self.requests_prerelease();
        versions
            .into_iter()
            .filter(|v| self.satisfies(v))
            .max_by(|a, b| {
                let rank_a = allow_prerelease || a.pre.is_empty();
                let rank_b = allow_prerelease || b.pre.is_empty();
                rank_a.cmp(&rank_b).then_with(|| a.cmp(b))
            })
    }

    fn parse_float(text: &str) -> VersionResult<Self> {
        if text == "*" {
            return Ok(Self {
                float: Some(FloatRange {
                    behavior: FloatBehavior::Major,
                    text: text.to_string(),
                }),
                ..Self::at_least(Version::new(0, 0, 0))
            });
        }

        if let Some(dash) = text.find('-') {
            let (base, label) = text.split_at(dash);
            let label = &label[1..];
            let Some(prefix) = label.strip_suffix('*') else {
                return Err(invalid_range(text, "'*' must end the prerelease label"));
            };
            if prefix.contains('*') || base.contains('*') {
                return Err(invalid_range(text, "only one '*' is allowed"));
            }
            let mut min = parse_version(base)?;
            let prefix = prefix.trim_end_matches('.');
            let prefix = if prefix.is_empty() { "0" } else { prefix };
            min.pre = Prerelease::new(prefix).map_err(|e| invalid_range(text, e.to_string()))?;
            return Ok(Self {
                float: Some(FloatRange {
                    behavior: FloatBehavior::Prerelease,
                    text: text.to_string(),
                }),
                ..Self::at_least(min)
            });
        }

        let Some(base) = text.strip_suffix(".*") else {
            return Err(invalid_range(text, "'*' may only replace the last part"));
        };
        if base.contains('*') {
            return Err(invalid_range(text, "only one '*' is allowed"));
        }
        let parts: Vec<&str> = base.split('.').collect();
        let floor = parse_version(base)?;
        let overflow = || invalid_range(text, "the floating part cannot be raised");
        let (behavior, mut ceiling) = match parts.len() {
            1 => (
                FloatBehavior::Minor,
                Version::new(floor.major.checked_add(1).ok_or_else(overflow)?, 0, 0),
            ),
            2 => (
                FloatBehavior::Patch,
                Version::new(floor.major, floor.minor.checked_add(1).ok_or_else(overflow)?, 0),
            ),
            _ => {
                return Err(invalid_range(
                    text,
                    "floating ranges have at most two fixed parts",
                ))
            }
        };
        // keep prereleases of the next major/minor out of the range
        ceiling.pre = Prerelease::new("0").map_err(|e| invalid_range(text, e.to_string()))?;

        Ok(Self {
            min: Some(floor),
            min_inclusive: true,
            max: Some(ceiling),
            max_inclusive: false,
            float: Some(FloatRange {
                behavior,
                text: text.to_string(),
            }),
        })
    }

    fn parse_interval(text: &str) -> VersionResult<Self> {
        let min_inclusive = text.starts_with('[');
        let max_inclusive = match text.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid_range(text, "missing closing ']' or ')'")),
        };
        if text.len() < 2 {
            return Err(invalid_range(text, "empty interval"));
        }
        let inner = &text[1..text.len() - 1];

        let Some((lo, hi)) = inner.split_once(',') else {
            if !(min_inclusive && max_inclusive) {
                return Err(invalid_range(text, "exact versions are written [x]"));
            }
            return Ok(Self::exact(parse_version(inner)?));
        };

        let bound = |part: &str| -> VersionResult<Option<Version>> {
            if part.trim().is_empty() {
                Ok(None)
            } else {
                parse_version(part).map(Some)
            }
        };

        Self::between(bound(lo)?, min_inclusive, bound(hi)?, max_inclusive)
            .map_err(|_| invalid_range(text, "minimum is above maximum"))
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid_range(s, "range is empty"));
        }
        if trimmed.starts_with('[') || trimmed.starts_with('(') {
            return Self::parse_interval(trimmed);
        }
        if trimmed.contains('*') {
            return Self::parse_float(trimmed);
        }
        Ok(Self::at_least(parse_version(trimmed)?))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(float) = &self.float {
            return f.write_str(&float.text);
        }
        if let Some(version) = self.exact_version() {
            return write!(f, "[{}]", version);
        }
        if let (Some(min), None, true) = (&self.min, &self.max, self.min_inclusive) {
            return write!(f, "[{}, )", min);
        }

        let open = if self.min_inclusive { '[' } else { '(' };
        let close = if self.max_inclusive { ']' } else { ')' };
        let min = self.min.as_ref().map(ToString::to_string).unwrap_or_default();
        let max = self.max.as_ref().map(ToString::to_string).unwrap_or_default();
        write!(f, "{}{}, {}{}", open, min, max, close)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[rstest]
    #[case("1", "1.0.0")]
    #[case("1.2", "1.2.0")]
    #[case("1.2.3", "1.2.3")]
    #[case("01.02.3", "1.2.3")]
    #[case("1.0-beta", "1.0.0-beta")]
    #[case(" 2.0.0+build.5 ", "2.0.0+build.5")]
    fn test_parse_version_pads(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse_version(input).unwrap(), Version::parse(expected).unwrap());
    }

    #[rstest]
    #[case("")]
    #[case("1.2.3.4")]
    #[case("a.b")]
    #[case("1..2")]
    fn test_parse_version_rejects(#[case] input: &str) {
        assert!(parse_version(input).is_err());
    }

    #[rstest]
    #[case("1.2.3", "[1.2.3, )")]
    #[case("[1.2.3]", "[1.2.3]")]
    #[case("[1.0,2.0)", "[1.0.0, 2.0.0)")]
    #[case("(1.0, )", "(1.0.0, )")]
    #[case("(,2.0]", "(, 2.0.0]")]
    #[case("1.*", "1.*")]
    #[case("1.2.3-*", "1.2.3-*")]
    #[case("*", "*")]
    fn test_display_normalizes(#[case] input: &str, #[case] expected: &str) {
        let range: VersionRange = input.parse().unwrap();
        assert_eq!(range.to_string(), expected);
        let reparsed: VersionRange = expected.parse().unwrap();
        assert_eq!(reparsed, range);
    }

    #[rstest]
    #[case("[2.0, 1.0]")]
    #[case("(1.0)")]
    #[case("[1.0, 1.0)")]
    #[case("1.*.3")]
    #[case("1.2.3.*")]
    #[case("[1.0, 2.0")]
    #[case("18446744073709551615.*")]
    #[case("1.18446744073709551615.*")]
    fn test_invalid_ranges(#[case] input: &str) {
        assert!(input.parse::<VersionRange>().is_err());
    }

    #[test]
    fn test_float_minor_bounds() {
        let range: VersionRange = "1.*".parse().unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0.0")));
        assert!(!range.satisfies(&v("2.0.0-alpha")));
        assert!(!range.requests_prerelease());
    }

    #[test]
    fn test_float_at_numeric_limit_is_an_error() {
        let err = "18446744073709551615.*".parse::<VersionRange>().unwrap_err();
        assert!(matches!(err, VersionError::InvalidRange { .. }), "{err}");
        let range: VersionRange = "18446744073709551614.*".parse().unwrap();
        assert!(range.satisfies(&Version::new(u64::MAX - 1, 3, 0)));
    }

    #[test]
    fn test_prerelease_float() {
        let range: VersionRange = "1.2.3-*".parse().unwrap();
        assert!(range.requests_prerelease());
        assert!(range.satisfies(&v("1.2.3-alpha")));
        assert!(range.satisfies(&v("1.4.0")));
        assert!(!range.satisfies(&v("1.2.2")));
    }

    #[test]
    fn test_best_match_prefers_stable() {
        let versions = vec![v("1.0.0"), v("1.1.0-beta"), v("1.0.5")];
        let range: VersionRange = "1.0.0".parse().unwrap();
        assert_eq!(range.find_best_match(&versions), Some(&v("1.0.5")));

        let pre: VersionRange = "1.1.0-alpha".parse().unwrap();
        assert_eq!(pre.find_best_match(&versions), Some(&v("1.1.0-beta")));
    }

    #[test]
    fn test_best_match_falls_back_to_prerelease() {
        let versions = vec![v("2.0.0-rc.1")];
        let range: VersionRange = "1.0.0".parse().unwrap();
        assert_eq!(range.find_best_match(&versions), Some(&v("2.0.0-rc.1")));
    }

    #[test]
    fn test_parse_pinned() {
        let pinned = VersionRange::parse_pinned("1.2.3").unwrap();
        assert_eq!(pinned.exact_version(), Some(&v("1.2.3")));
        let ranged = VersionRange::parse_pinned("[1.0, 2.0)").unwrap();
        assert!(ranged.exact_version().is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let range: VersionRange = "[1.0, 2.0)".parse().unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, "\"[1.0.0, 2.0.0)\"");
        let back: VersionRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }

    proptest! {
        #[test]
        fn prop_at_least_admits_its_floor(major in 0u64..50, minor in 0u64..50, patch in 0u64..50) {
            let floor = Version::new(major, minor, patch);
            let range = VersionRange::at_least(floor.clone());
            prop_assert!(range.satisfies(&floor));
            prop_assert_eq!(range.find_best_match([&floor]), Some(&floor));
        }

        #[test]
        fn prop_exact_admits_only_itself(a in (0u64..20, 0u64..20, 0u64..20), b in (0u64..20, 0u64..20, 0u64..20)) {
            let pinned = Version::new(a.0, a.1, a.2);
            let other = Version::new(b.0, b.1, b.2);
            let range = VersionRange::exact(pinned.clone());
            prop_assert_eq!(range.satisfies(&other), pinned == other);
        }

        #[test]
        fn prop_display_is_stable(lo in 0u64..10, width in 0u64..10, min_inc: bool, max_inc: bool) {
            let min = Version::new(lo, 0, 0);
            let max = Version::new(lo + width + 1, 0, 0);
            let range = VersionRange::between(Some(min), min_inc, Some(max), max_inc).unwrap();
            let reparsed: VersionRange = range.to_string().parse().unwrap();
            prop_assert_eq!(reparsed.to_string(), range.to_string());
        }
    }
}
