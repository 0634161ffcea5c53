//! Per-project restore input (`PackageSpec`)
//!
//! A `PackageSpec` is produced by whatever reads the project system and is
//! treated as immutable for the duration of one restore.

use crate::framework::FrameworkMoniker;
use crate::version::VersionRange;
use semver::Version;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not, Sub};
use std::path::PathBuf;

/// Set of asset groups a dependency contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetFlags(u8);

const FLAG_NAMES: &[(&str, u8)] = &[
    ("compile", 1 << 0),
    ("runtime", 1 << 1),
    ("build", 1 << 2),
    ("buildMultitargeting", 1 << 3),
    ("contentFiles", 1 << 4),
    ("native", 1 << 5),
    ("analyzers", 1 << 6),
];

impl AssetFlags {
    pub const NONE: AssetFlags = AssetFlags(0);
    pub const COMPILE: AssetFlags = AssetFlags(1 << 0);
    pub const RUNTIME: AssetFlags = AssetFlags(1 << 1);
    pub const BUILD: AssetFlags = AssetFlags(1 << 2);
    pub const BUILD_MULTITARGETING: AssetFlags = AssetFlags(1 << 3);
    pub const CONTENT_FILES: AssetFlags = AssetFlags(1 << 4);
    pub const NATIVE: AssetFlags = AssetFlags(1 << 5);
    pub const ANALYZERS: AssetFlags = AssetFlags(1 << 6);
    pub const ALL: AssetFlags = AssetFlags(0b0111_1111);

    pub fn all() -> Self {
        Self::ALL
    }

    pub fn none() -> Self {
        Self::NONE
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    pub fn contains(self, other: AssetFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse one flag name; `all` and `none` are accepted too
    pub fn parse_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" => return Some(Self::ALL),
            "none" => return Some(Self::NONE),
            _ => {}
        }
        FLAG_NAMES
            .iter()
            .find(|(flag, _)| flag.eq_ignore_ascii_case(name.trim()))
            .map(|(_, bit)| AssetFlags(*bit))
    }

    /// Flag names in canonical order
    pub fn names(self) -> Vec<&'static str> {
        FLAG_NAMES
            .iter()
            .filter(|(_, bit)| self.0 & bit != 0)
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for AssetFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        AssetFlags(self.0 | rhs.0)
    }
}

impl BitAnd for AssetFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        AssetFlags(self.0 & rhs.0)
    }
}

impl Sub for AssetFlags {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        AssetFlags(self.0 & !rhs.0)
    }
}

impl Not for AssetFlags {
    type Output = Self;
    fn not(self) -> Self {
        AssetFlags(!self.0 & Self::ALL.0)
    }
}

impl fmt::Display for AssetFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("all");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(";"))
    }
}

impl Serialize for AssetFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

impl<'de> Deserialize<'de> for AssetFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            List(Vec<String>),
            Joined(String),
        }

        let names = match Repr::deserialize(deserializer)? {
            Repr::List(names) => names,
            Repr::Joined(text) => text.split(';').map(str::to_string).collect(),
        };

        names
            .iter()
            .filter(|n| !n.trim().is_empty())
            .try_fold(AssetFlags::NONE, |acc, name| {
                AssetFlags::parse_name(name)
                    .map(|flag| acc | flag)
                    .ok_or_else(|| de::Error::custom(format!("unknown asset flag '{}'", name)))
            })
    }
}

/// Lock file policy for a project
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LockPolicy {
    /// No lock file is read or written
    #[default]
    None,
    /// Locked versions are hints; the file is rewritten when resolution changes
    WriteOnChange,
    /// Locked versions are mandatory; any drift fails restore
    EnforceLocked,
}

/// What a library reference points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyTarget {
    #[default]
    Package,
    Project,
}

/// Library id plus requested range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRange {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<VersionRange>,
    #[serde(default)]
    pub target: DependencyTarget,
}

impl LibraryRange {
    pub fn package(name: impl Into<String>, range: Option<VersionRange>) -> Self {
        Self {
            name: name.into(),
            range,
            target: DependencyTarget::Package,
        }
    }

    pub fn project(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: None,
            target: DependencyTarget::Project,
        }
    }
}

impl fmt::Display for LibraryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} {}", self.name, range),
            None => f.write_str(&self.name),
        }
    }
}

/// A direct dependency declared by a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDependency {
    #[serde(flatten)]
    pub library_range: LibraryRange,

    /// Explicit include set; `None` means every asset group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<AssetFlags>,

    #[serde(default, skip_serializing_if = "AssetFlags::is_empty")]
    pub exclude: AssetFlags,

    /// Asset groups that do not flow to projects referencing this one
    #[serde(default, skip_serializing_if = "AssetFlags::is_empty")]
    pub private_assets: AssetFlags,

    /// Project-local range that wins over the central table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_override: Option<VersionRange>,
}

impl LibraryDependency {
    pub fn package(name: impl Into<String>, range: Option<VersionRange>) -> Self {
        Self {
            library_range: LibraryRange::package(name, range),
            include: None,
            exclude: AssetFlags::NONE,
            private_assets: AssetFlags::NONE,
            version_override: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.library_range.name
    }

    pub fn range(&self) -> Option<&VersionRange> {
        self.library_range.range.as_ref()
    }

    pub fn is_project(&self) -> bool {
        self.library_range.target == DependencyTarget::Project
    }

    /// Asset groups the consuming project receives
    pub fn effective_include(&self) -> AssetFlags {
        self.include.unwrap_or(AssetFlags::ALL) - self.exclude
    }

    /// Whether compile assets were asked for explicitly
    pub fn explicitly_includes_compile(&self) -> bool {
        self.include
            .is_some_and(|flags| flags.contains(AssetFlags::COMPILE))
    }
}

/// Reference to another project by unique name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReference {
    pub unique_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<AssetFlags>,

    #[serde(default, skip_serializing_if = "AssetFlags::is_empty")]
    pub exclude: AssetFlags,

    #[serde(default, skip_serializing_if = "AssetFlags::is_empty")]
    pub private_assets: AssetFlags,
}

impl ProjectReference {
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            include: None,
            exclude: AssetFlags::NONE,
            private_assets: AssetFlags::NONE,
        }
    }

    pub fn effective_include(&self) -> AssetFlags {
        self.include.unwrap_or(AssetFlags::ALL) - self.exclude
    }
}

/// Central package version entry; a bare version pins exactly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralVersion {
    pub range: VersionRange,
}

impl CentralVersion {
    pub fn new(range: VersionRange) -> Self {
        Self { range }
    }
}

impl Serialize for CentralVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.range.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CentralVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        VersionRange::parse_pinned(&text)
            .map(CentralVersion::new)
            .map_err(de::Error::custom)
    }
}

/// One target framework of a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetFrameworkInfo {
    pub framework: FrameworkMoniker,

    /// Fallback frameworks tried when nothing is directly compatible
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<FrameworkMoniker>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<LibraryDependency>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_references: Vec<ProjectReference>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub central_versions: BTreeMap<String, CentralVersion>,
}

impl TargetFrameworkInfo {
    pub fn new(framework: FrameworkMoniker) -> Self {
        Self {
            framework,
            imports: Vec::new(),
            dependencies: Vec::new(),
            project_references: Vec::new(),
            central_versions: BTreeMap::new(),
        }
    }

    /// Package-kind dependencies, in declaration order
    pub fn package_dependencies(&self) -> impl Iterator<Item = &LibraryDependency> {
        self.dependencies.iter().filter(|d| !d.is_project())
    }

    /// Declared project references plus project-kind dependencies
    pub fn all_project_references(&self) -> Vec<ProjectReference> {
        let mut refs = self.project_references.clone();
        for dep in self.dependencies.iter().filter(|d| d.is_project()) {
            if !refs.iter().any(|r| r.unique_name == dep.name()) {
                refs.push(ProjectReference {
                    unique_name: dep.name().to_string(),
                    include: dep.include,
                    exclude: dep.exclude,
                    private_assets: dep.private_assets,
                });
            }
        }
        refs
    }
}

/// Restore-specific project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RestoreMetadata {
    /// Stable identity used by project references
    pub unique_name: String,

    pub project_path: PathBuf,

    /// Directory receiving the asset manifest and the no-op cache file
    pub output_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file_path: Option<PathBuf>,

    #[serde(default)]
    pub lock_policy: LockPolicy,

    #[serde(default)]
    pub central_package_versions: bool,

    /// Central entries also constrain transitive occurrences
    #[serde(default)]
    pub transitive_pinning: bool,
}

fn default_project_version() -> Version {
    Version::new(1, 0, 0)
}

/// A project's declared restore input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    pub name: String,

    #[serde(default = "default_project_version")]
    pub version: Version,

    pub restore_metadata: RestoreMetadata,

    #[serde(default)]
    pub frameworks: Vec<TargetFrameworkInfo>,
}

impl PackageSpec {
    /// A spec named `name` whose unique name is also `name`
    pub fn new(name: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let project_dir = project_dir.into();
        Self {
            version: default_project_version(),
            restore_metadata: RestoreMetadata {
                unique_name: name.clone(),
                project_path: project_dir.join(format!("{}.proj", name)),
                output_path: project_dir.join("obj"),
                ..Default::default()
            },
            frameworks: Vec::new(),
            name,
        }
    }

    pub fn unique_name(&self) -> &str {
        &self.restore_metadata.unique_name
    }

    pub fn framework(&self, moniker: &FrameworkMoniker) -> Option<&TargetFrameworkInfo> {
        self.frameworks.iter().find(|f| &f.framework == moniker)
    }

    /// Directory containing the project file
    pub fn project_dir(&self) -> PathBuf {
        self.restore_metadata
            .project_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }

    /// Whether central package version management applies to `framework`
    pub fn uses_central_versions(&self, framework: &TargetFrameworkInfo) -> bool {
        self.restore_metadata.central_package_versions || !framework.central_versions.is_empty()
    }

    /// Unique names of every project this spec references, any framework
    pub fn referenced_projects(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .frameworks
            .iter()
            .flat_map(|f| f.all_project_references())
            .map(|r| r.unique_name)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
