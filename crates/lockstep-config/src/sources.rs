//! Package source lists
//!
//! The restore core treats the source list as an opaque, ordered list. How it
//! is assembled (global config, project config, caller overrides) is decided
//! here and nowhere else.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A package source entry (`[[sources]]`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct PackageSource {
    /// Unique display name
    pub name: String,

    /// Feed location (URL or local folder)
    pub url: String,

    /// Disabled sources stay in the list but are never queried
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PackageSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    /// Key used to memoize providers built for this source
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.name, self.url)
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// How versions offered by several sources are merged
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceSelection {
    /// Union of every source; the highest satisfying version wins
    #[default]
    HighestVersion,
    /// The first source listing any version of a package is authoritative
    SourceOrder,
}

impl SourceSelection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "highest-version" | "highest" => Some(Self::HighestVersion),
            "source-order" | "ordered" => Some(Self::SourceOrder),
            _ => None,
        }
    }
}

/// Validate a source list: names and urls must be set and names unique
pub fn validate_sources(sources: &[PackageSource]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for (idx, source) in sources.iter().enumerate() {
        if source.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("sources[{}].name", idx),
                reason: "name cannot be empty".to_string(),
            });
        }
        if source.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("sources[{}].url", idx),
                reason: "url cannot be empty".to_string(),
            });
        }
        if !seen.insert(source.name.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateSource(source.name.clone()));
        }
    }
    Ok(())
}

/// Merge two source lists. Entries in `overrides` replace same-named entries
/// in place; new names are appended, keeping the original order stable.
pub fn merge_sources(base: &[PackageSource], overrides: &[PackageSource]) -> Vec<PackageSource> {
    let mut merged = base.to_vec();
    for source in overrides {
        match merged
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(&source.name))
        {
            Some(existing) => *existing = source.clone(),
            None => merged.push(source.clone()),
        }
    }
    merged
}
