//! Pinned manifest (`packages.lock.json`) for reproducible restores
//!
//! The writer emits frameworks in moniker order and, inside each framework,
//! Direct entries, then Transitive, then Project, each alphabetical ignoring
//! case. The reader re-sorts into the same order, so a read/write cycle is
//! byte-stable.

use crate::error::{RestoreError, RestoreResult};
use crate::fs;
use crate::graph::{compare_libraries, DependencyType, ResolvedGraph};
use lockstep_model::{FrameworkMoniker, PackageSpec, VersionRange};
use semver::Version;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

mod reconcile;

pub use reconcile::{differences, validate, LockOutcome, LockReconciler, LockState};

pub const LOCK_FILE_NAME: &str = "packages.lock.json";

/// Key of a content hash: package id and version
pub type PackageKey = (String, Version);

/// One locked dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<VersionRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub centrally_managed: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, VersionRange>,
}

impl LockEntry {
    pub fn is_package(&self) -> bool {
        self.dependency_type != DependencyType::Project
    }
}

/// Locked entries of one framework, in canonical order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTarget {
    pub framework: FrameworkMoniker,
    pub entries: Vec<(String, LockEntry)>,
}

impl LockTarget {
    pub fn new(framework: FrameworkMoniker, mut entries: Vec<(String, LockEntry)>) -> Self {
        entries.sort_by(|(a_id, a), (b_id, b)| {
            a.dependency_type
                .cmp(&b.dependency_type)
                .then_with(|| a_id.to_lowercase().cmp(&b_id.to_lowercase()))
                .then_with(|| a_id.cmp(b_id))
        });
        Self { framework, entries }
    }

    /// Package entry by id
    pub fn entry(&self, id: &str) -> Option<&LockEntry> {
        self.find(id, true)
    }

    /// Project entry by lowercase project name
    pub fn project(&self, name: &str) -> Option<&LockEntry> {
        self.find(name, false)
    }

    /// Packages and projects are separate namespaces that may share a key
    fn find(&self, key: &str, package: bool) -> Option<&LockEntry> {
        self.entries
            .iter()
            .find(|(k, e)| k == key && e.is_package() == package)
            .map(|(_, e)| e)
    }
}

/// The lock file document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    pub version: u32,
    pub targets: Vec<LockTarget>,
}

impl LockFile {
    /// Current lock file format version
    pub const VERSION: u32 = 1;

    pub fn new(mut targets: Vec<LockTarget>) -> Self {
        targets.sort_by(|a, b| a.framework.cmp(&b.framework));
        Self {
            version: Self::VERSION,
            targets,
        }
    }

    /// Build the lock file for a resolved graph, recording content hashes
    pub fn from_graph(graph: &ResolvedGraph, hashes: &HashMap<PackageKey, String>) -> Self {
        let targets = graph
            .targets
            .iter()
            .map(|target| {
                let mut libraries: Vec<_> = target.libraries.iter().collect();
                libraries.sort_by(|a, b| compare_libraries(a, b));

                let mut entries: Vec<(String, LockEntry)> = Vec::new();
                for library in libraries {
                    let key = if library.is_package() {
                        library.id.clone()
                    } else {
                        library.id.to_lowercase()
                    };
                    if entries.iter().any(|(k, e)| {
                        e.is_package() == library.is_package() && k.eq_ignore_ascii_case(&key)
                    }) {
                        continue;
                    }
                    let entry = if library.is_package() {
                        LockEntry {
                            dependency_type: library.dependency_type,
                            requested: library.requested.clone(),
                            resolved: Some(library.version.clone()),
                            content_hash: hashes
                                .get(&(library.id.clone(), library.version.clone()))
                                .cloned(),
                            centrally_managed: library.centrally_managed,
                            dependencies: library.dependencies.clone(),
                        }
                    } else {
                        LockEntry {
                            dependency_type: DependencyType::Project,
                            requested: None,
                            resolved: None,
                            content_hash: None,
                            centrally_managed: false,
                            dependencies: library.dependencies.clone(),
                        }
                    };
                    entries.push((key, entry));
                }
                LockTarget::new(target.framework.clone(), entries)
            })
            .collect();
        Self::new(targets)
    }

    pub fn target(&self, framework: &FrameworkMoniker) -> Option<&LockTarget> {
        self.targets.iter().find(|t| &t.framework == framework)
    }

    /// Recorded content hashes of every package entry
    pub fn content_hashes(&self) -> HashMap<PackageKey, String> {
        self.targets
            .iter()
            .flat_map(|t| t.entries.iter())
            .filter_map(|(id, entry)| {
                let version = entry.resolved.clone()?;
                let hash = entry.content_hash.clone()?;
                Some(((id.clone(), version), hash))
            })
            .collect()
    }

    /// Locked package versions per framework
    pub fn locked_versions(&self) -> BTreeMap<FrameworkMoniker, BTreeMap<String, Version>> {
        self.targets
            .iter()
            .map(|t| {
                let versions = t
                    .entries
                    .iter()
                    .filter(|(_, e)| e.is_package())
                    .filter_map(|(id, e)| e.resolved.clone().map(|v| (id.clone(), v)))
                    .collect();
                (t.framework.clone(), versions)
            })
            .collect()
    }

    /// 2-space indented JSON with a trailing newline
    pub fn to_json(&self) -> RestoreResult<String> {
        let mut json =
            serde_json::to_string_pretty(self).map_err(|e| RestoreError::json("lock file", e))?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let raw: RawLockFile = serde_json::from_str(json)?;
        Ok(raw.into())
    }

    /// Read a lock file; `Ok(None)` when it does not exist
    pub fn load(path: &Path) -> RestoreResult<Option<Self>> {
        match fs::read_optional(path)? {
            Some(content) => Self::from_json(&content)
                .map(Some)
                .map_err(|e| RestoreError::json("lock file", e)),
            None => Ok(None),
        }
    }

    /// Write the file only when its bytes change; returns whether it was written
    pub fn save(&self, path: &Path) -> RestoreResult<bool> {
        fs::write_if_changed(path, self.to_json()?.as_bytes())
    }
}

/// Where a project's lock file lives: the explicit path, else
/// `packages.<project name>.lock.json` when it exists, else `packages.lock.json`
pub fn lock_file_path(spec: &PackageSpec) -> PathBuf {
    let dir = spec.project_dir();
    if let Some(path) = &spec.restore_metadata.lock_file_path {
        return if path.is_absolute() {
            path.clone()
        } else {
            dir.join(path)
        };
    }
    let named = dir.join(format!("packages.{}.lock.json", spec.name.replace(' ', "_")));
    if named.exists() {
        named
    } else {
        dir.join(LOCK_FILE_NAME)
    }
}

struct OrderedEntries<'a>(&'a [(String, LockEntry)]);

impl Serialize for OrderedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, entry) in self.0 {
            map.serialize_entry(id, entry)?;
        }
        map.end()
    }
}

struct OrderedTargets<'a>(&'a [LockTarget]);

impl Serialize for OrderedTargets<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for target in self.0 {
            map.serialize_entry(&target.framework.to_string(), &OrderedEntries(&target.entries))?;
        }
        map.end()
    }
}

impl Serialize for LockFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("version", &self.version)?;
        map.serialize_entry("dependencies", &OrderedTargets(&self.targets))?;
        map.end()
    }
}

#[derive(Deserialize)]
struct RawLockFile {
    version: u32,
    #[serde(default)]
    dependencies: BTreeMap<FrameworkMoniker, RawEntries>,
}

/// Entries of one framework in file order. A package and a project with
/// the same key both survive.
struct RawEntries(Vec<(String, LockEntry)>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of lock entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawEntries, A::Error> {
                let mut entries = Vec::new();
                while let Some((id, entry)) = map.next_entry::<String, LockEntry>()? {
                    entries.push((id, entry));
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl From<RawLockFile> for LockFile {
    fn from(raw: RawLockFile) -> Self {
        let targets = raw
            .dependencies
            .into_iter()
            .map(|(framework, entries)| LockTarget::new(framework, entries.0))
            .collect();
        Self {
            version: raw.version,
            ..Self::new(targets)
        }
    }
}
