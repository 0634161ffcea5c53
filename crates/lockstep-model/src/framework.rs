//! Target framework monikers and compatibility rules

use semver::Version;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameworkError {
    #[error("Framework moniker is empty")]
    Empty,

    #[error("Invalid framework moniker '{0}'")]
    Invalid(String),
}

/// Framework family, ordered so that lock files list families predictably
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameworkFamily {
    /// .NET Framework (`net45`, `net472`)
    NetFramework,
    /// .NET Core and .NET 5+ (`netcoreapp3.1`, `net8.0`)
    NetCore,
    /// .NET Standard (`netstandard2.0`)
    NetStandard,
    /// Framework-neutral assets
    Any,
    /// Anything else, keyed by its identifier
    Other(String),
}

/// A parsed target framework moniker such as `net472` or `netstandard2.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameworkMoniker {
    family: FrameworkFamily,
    version: Version,
}

/// Result of picking a framework for a consumer, possibly via `imports`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkMatch {
    pub framework: FrameworkMoniker,
    /// Set when the match came from the consumer's `imports` list
    pub fallback: bool,
}

impl FrameworkMoniker {
    pub fn new(family: FrameworkFamily, version: Version) -> Self {
        Self { family, version }
    }

    pub fn any() -> Self {
        Self::new(FrameworkFamily::Any, Version::new(0, 0, 0))
    }

    pub fn family(&self) -> &FrameworkFamily {
        &self.family
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Parse a short folder name
    pub fn parse(input: &str) -> Result<Self, FrameworkError> {
        let lowered = input.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return Err(FrameworkError::Empty);
        }
        if lowered == "any" {
            return Ok(Self::any());
        }

        let split = lowered
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(lowered.len());
        let (identifier, version_text) = lowered.split_at(split);
        if identifier.is_empty() {
            return Err(FrameworkError::Invalid(input.to_string()));
        }

        let version = parse_framework_version(version_text, identifier == "net")
            .ok_or_else(|| FrameworkError::Invalid(input.to_string()))?;

        let family = match identifier {
            "net" if version.major >= 5 => FrameworkFamily::NetCore,
            "net" => FrameworkFamily::NetFramework,
            "netcoreapp" => FrameworkFamily::NetCore,
            "netstandard" => FrameworkFamily::NetStandard,
            other => FrameworkFamily::Other(other.to_string()),
        };

        Ok(Self::new(family, version))
    }

    /// Highest netstandard version this framework can consume
    fn max_netstandard(&self) -> Option<Version> {
        let v = &self.version;
        let at_least = |major, minor, patch| *v >= Version::new(major, minor, patch);
        match self.family {
            FrameworkFamily::NetCore if at_least(3, 0, 0) => Some(Version::new(2, 1, 0)),
            FrameworkFamily::NetCore if at_least(2, 0, 0) => Some(Version::new(2, 0, 0)),
            FrameworkFamily::NetCore => Some(Version::new(1, 6, 0)),
            FrameworkFamily::NetFramework if at_least(4, 6, 1) => Some(Version::new(2, 0, 0)),
            FrameworkFamily::NetFramework if at_least(4, 6, 0) => Some(Version::new(1, 3, 0)),
            FrameworkFamily::NetFramework if at_least(4, 5, 1) => Some(Version::new(1, 2, 0)),
            FrameworkFamily::NetFramework if at_least(4, 5, 0) => Some(Version::new(1, 1, 0)),
            _ => None,
        }
    }

    /// Whether a project targeting `self` can consume assets built for `candidate`
    pub fn is_compatible(&self, candidate: &FrameworkMoniker) -> bool {
        if candidate.family == FrameworkFamily::Any {
            return true;
        }
        if candidate.family == self.family {
            return candidate.version <= self.version;
        }
        if candidate.family == FrameworkFamily::NetStandard {
            return self
                .max_netstandard()
                .is_some_and(|max| candidate.version <= max);
        }
        false
    }

    /// The best compatible candidate: same family with the highest version,
    /// then the highest netstandard, then `any`
    pub fn nearest<'a, I>(&self, candidates: I) -> Option<&'a FrameworkMoniker>
    where
        I: IntoIterator<Item = &'a FrameworkMoniker>,
    {
        candidates
            .into_iter()
            .filter(|c| self.is_compatible(c))
            .max_by(|a, b| {
                self.preference(a)
                    .cmp(&self.preference(b))
                    .then_with(|| a.version.cmp(&b.version))
            })
    }

    fn preference(&self, candidate: &FrameworkMoniker) -> u8 {
        if candidate.family == self.family {
            2
        } else if candidate.family == FrameworkFamily::NetStandard {
            1
        } else {
            0
        }
    }

    /// `nearest`, retrying with each `imports` entry in order when nothing matches
    pub fn nearest_with_fallback<'a, I>(
        &self,
        imports: &[FrameworkMoniker],
        candidates: I,
    ) -> Option<FrameworkMatch>
    where
        I: IntoIterator<Item = &'a FrameworkMoniker>,
        I::IntoIter: Clone,
    {
        let candidates = candidates.into_iter();
        if let Some(found) = self.nearest(candidates.clone()) {
            return Some(FrameworkMatch {
                framework: found.clone(),
                fallback: false,
            });
        }
        imports.iter().find_map(|import| {
            import
                .nearest(candidates.clone())
                .map(|found| FrameworkMatch {
                    framework: found.clone(),
                    fallback: true,
                })
        })
    }
}

fn parse_framework_version(text: &str, compact_net: bool) -> Option<Version> {
    if text.is_empty() {
        return Some(Version::new(0, 0, 0));
    }
    if !text.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let parts: Vec<u64> = if text.contains('.') {
        text.split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?
    } else if compact_net && text.starts_with(|c: char| c < '5') {
        // net472 -> 4.7.2
        text.chars()
            .map(|c| c.to_digit(10).map(u64::from))
            .collect::<Option<Vec<_>>>()?
    } else {
        vec![text.parse::<u64>().ok()?]
    };

    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let get = |i: usize| parts.get(i).copied().unwrap_or(0);
    Some(Version::new(get(0), get(1), get(2)))
}

impl FromStr for FrameworkMoniker {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FrameworkMoniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.version;
        match &self.family {
            FrameworkFamily::Any => f.write_str("any"),
            FrameworkFamily::NetFramework => {
                write!(f, "net{}{}", v.major, v.minor)?;
                if v.patch > 0 {
                    write!(f, "{}", v.patch)?;
                }
                Ok(())
            }
            FrameworkFamily::NetCore if v.major >= 5 => write!(f, "net{}.{}", v.major, v.minor),
            FrameworkFamily::NetCore => write!(f, "netcoreapp{}.{}", v.major, v.minor),
            FrameworkFamily::NetStandard => write!(f, "netstandard{}.{}", v.major, v.minor),
            FrameworkFamily::Other(id) if *v == Version::new(0, 0, 0) => f.write_str(id),
            FrameworkFamily::Other(id) => {
                write!(f, "{}{}.{}", id, v.major, v.minor)?;
                if v.patch > 0 {
                    write!(f, ".{}", v.patch)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for FrameworkMoniker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameworkMoniker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tfm(s: &str) -> FrameworkMoniker {
        FrameworkMoniker::parse(s).unwrap()
    }

    #[rstest]
    #[case("net45", FrameworkFamily::NetFramework, "4.5.0", "net45")]
    #[case("NET472", FrameworkFamily::NetFramework, "4.7.2", "net472")]
    #[case("netcoreapp3.1", FrameworkFamily::NetCore, "3.1.0", "netcoreapp3.1")]
    #[case("net8.0", FrameworkFamily::NetCore, "8.0.0", "net8.0")]
    #[case("net5", FrameworkFamily::NetCore, "5.0.0", "net5.0")]
    #[case("netstandard2.0", FrameworkFamily::NetStandard, "2.0.0", "netstandard2.0")]
    #[case("any", FrameworkFamily::Any, "0.0.0", "any")]
    #[case("uap10.0", FrameworkFamily::Other("uap".to_string()), "10.0.0", "uap10.0")]
    fn test_parse_moniker(
        #[case] input: &str,
        #[case] family: FrameworkFamily,
        #[case] version: &str,
        #[case] display: &str,
    ) {
        let moniker = tfm(input);
        assert_eq!(moniker.family(), &family);
        assert_eq!(moniker.version(), &Version::parse(version).unwrap());
        assert_eq!(moniker.to_string(), display);
    }

    #[rstest]
    #[case("")]
    #[case("4.5")]
    #[case("net4x")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(FrameworkMoniker::parse(input).is_err());
    }

    #[rstest]
    #[case("net472", "net45", true)]
    #[case("net45", "net472", false)]
    #[case("net472", "netstandard2.0", true)]
    #[case("net46", "netstandard2.0", false)]
    #[case("netcoreapp2.1", "netstandard2.0", true)]
    #[case("netcoreapp2.1", "netstandard2.1", false)]
    #[case("net8.0", "netstandard2.1", true)]
    #[case("net8.0", "netcoreapp3.1", true)]
    #[case("net8.0", "net472", false)]
    #[case("netstandard2.0", "any", true)]
    #[case("netstandard2.0", "net8.0", false)]
    fn test_compatibility(#[case] project: &str, #[case] candidate: &str, #[case] ok: bool) {
        assert_eq!(tfm(project).is_compatible(&tfm(candidate)), ok);
    }

    #[test]
    fn test_nearest_prefers_same_family() {
        let candidates = vec![tfm("netstandard2.0"), tfm("net45"), tfm("net461"), tfm("any")];
        assert_eq!(tfm("net472").nearest(&candidates), Some(&tfm("net461")));
        assert_eq!(tfm("net8.0").nearest(&candidates), Some(&tfm("netstandard2.0")));
        assert_eq!(tfm("netstandard1.0").nearest(&candidates), Some(&tfm("any")));
    }

    #[test]
    fn test_fallback_through_imports() {
        let candidates = vec![tfm("net45")];
        let project = tfm("netcoreapp3.1");

        assert_eq!(project.nearest(&candidates), None);
        let found = project
            .nearest_with_fallback(&[tfm("net461")], &candidates)
            .unwrap();
        assert_eq!(found.framework, tfm("net45"));
        assert!(found.fallback);
    }
}
