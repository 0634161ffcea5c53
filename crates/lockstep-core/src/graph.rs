//! Resolved dependency graph
//!
//! One [`ResolvedTarget`] per (project, framework) holds at most one library
//! per package id. Libraries are kept in canonical order: Direct, then
//! Transitive, then Project, each case-insensitively alphabetical.

use lockstep_model::{AssetFlags, FrameworkMoniker, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How a library entered the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyType {
    Direct,
    Transitive,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Package,
    Project,
}

/// Selected asset paths per group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetGroups {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compile: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub native: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_multitargeting: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyzers: Vec<String>,
}

impl AssetGroups {
    pub fn is_empty(&self) -> bool {
        self.compile.is_empty()
            && self.runtime.is_empty()
            && self.native.is_empty()
            && self.build.is_empty()
            && self.build_multitargeting.is_empty()
            && self.content_files.is_empty()
            && self.analyzers.is_empty()
    }

    /// Drop every group not named in `flags`
    pub fn filtered(mut self, flags: AssetFlags) -> Self {
        let keep = |group: &mut Vec<String>, flag: AssetFlags| {
            if !flags.contains(flag) {
                group.clear();
            }
        };
        keep(&mut self.compile, AssetFlags::COMPILE);
        keep(&mut self.runtime, AssetFlags::RUNTIME);
        keep(&mut self.native, AssetFlags::NATIVE);
        keep(&mut self.build, AssetFlags::BUILD);
        keep(&mut self.build_multitargeting, AssetFlags::BUILD_MULTITARGETING);
        keep(&mut self.content_files, AssetFlags::CONTENT_FILES);
        keep(&mut self.analyzers, AssetFlags::ANALYZERS);
        self
    }
}

/// One library of a resolved target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLibrary {
    pub id: String,
    pub version: Version,
    pub kind: LibraryKind,
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub centrally_managed: bool,

    /// Range the project asked for (direct dependencies only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<VersionRange>,

    /// Declared dependencies of the selected version
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, VersionRange>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub development_dependency: bool,

    /// Framework picked inside a referenced project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkMoniker>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_framework: bool,

    /// Project file path (project libraries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Effective asset flags after include/exclude and suppression
    #[serde(default)]
    pub flags: AssetFlags,

    #[serde(default)]
    pub assets: AssetGroups,
}

impl ResolvedLibrary {
    pub fn is_package(&self) -> bool {
        self.kind == LibraryKind::Package
    }

    /// `id/version`, the key of the asset manifest `libraries` and `projects` sections
    pub fn key(&self) -> String {
        format!("{}/{}", self.id, self.version)
    }
}

/// Canonical ordering: dependency type, then id ignoring case, then id
pub fn compare_libraries(a: &ResolvedLibrary, b: &ResolvedLibrary) -> Ordering {
    a.dependency_type
        .cmp(&b.dependency_type)
        .then_with(|| a.id.to_lowercase().cmp(&b.id.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Resolved libraries of one framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub framework: FrameworkMoniker,
    pub libraries: Vec<ResolvedLibrary>,
}

impl ResolvedTarget {
    pub fn new(framework: FrameworkMoniker, mut libraries: Vec<ResolvedLibrary>) -> Self {
        libraries.sort_by(compare_libraries);
        Self {
            framework,
            libraries,
        }
    }

    /// The package `id`, else the project of that name. A package and a
    /// project may share an id; use [`Self::package`] or [`Self::project`]
    /// to pick one.
    pub fn library(&self, id: &str) -> Option<&ResolvedLibrary> {
        self.package(id).or_else(|| self.project(id))
    }

    pub fn package(&self, id: &str) -> Option<&ResolvedLibrary> {
        self.packages().find(|l| l.id == id)
    }

    pub fn project(&self, name: &str) -> Option<&ResolvedLibrary> {
        self.libraries
            .iter()
            .find(|l| l.kind == LibraryKind::Project && l.id == name)
    }

    pub fn packages(&self) -> impl Iterator<Item = &ResolvedLibrary> {
        self.libraries.iter().filter(|l| l.is_package())
    }
}

/// Resolution result of one project across its frameworks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvedGraph {
    pub targets: Vec<ResolvedTarget>,
}

impl ResolvedGraph {
    pub fn new(mut targets: Vec<ResolvedTarget>) -> Self {
        targets.sort_by(|a, b| a.framework.cmp(&b.framework));
        Self { targets }
    }

    pub fn target(&self, framework: &FrameworkMoniker) -> Option<&ResolvedTarget> {
        self.targets.iter().find(|t| &t.framework == framework)
    }

    /// Distinct (id, version) pairs of every package library
    pub fn package_identities(&self) -> Vec<(String, Version)> {
        let mut identities: Vec<(String, Version)> = self
            .targets
            .iter()
            .flat_map(|t| t.packages())
            .map(|l| (l.id.clone(), l.version.clone()))
            .collect();
        identities.sort();
        identities.dedup();
        identities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(id: &str, dependency_type: DependencyType) -> ResolvedLibrary {
        ResolvedLibrary {
            id: id.to_string(),
            version: Version::new(1, 0, 0),
            kind: if dependency_type == DependencyType::Project {
                LibraryKind::Project
            } else {
                LibraryKind::Package
            },
            dependency_type,
            centrally_managed: false,
            requested: None,
            dependencies: BTreeMap::new(),
            development_dependency: false,
            framework: None,
            fallback_framework: false,
            path: None,
            flags: AssetFlags::ALL,
            assets: AssetGroups::default(),
        }
    }

    #[test]
    fn test_canonical_order() {
        let target = ResolvedTarget::new(
            FrameworkMoniker::parse("net8.0").unwrap(),
            vec![
                library("zeta", DependencyType::Transitive),
                library("Lib", DependencyType::Project),
                library("beta", DependencyType::Direct),
                library("Alpha", DependencyType::Transitive),
                library("alpha2", DependencyType::Direct),
            ],
        );
        let ids: Vec<_> = target.libraries.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha2", "beta", "Alpha", "zeta", "Lib"]);
    }

    #[test]
    fn test_package_and_project_sharing_an_id() {
        let mut project = library("Lib", DependencyType::Project);
        project.version = Version::new(3, 0, 0);
        let target = ResolvedTarget::new(
            FrameworkMoniker::parse("net8.0").unwrap(),
            vec![project, library("Lib", DependencyType::Direct)],
        );

        assert_eq!(target.package("Lib").unwrap().version, Version::new(1, 0, 0));
        assert_eq!(target.project("Lib").unwrap().version, Version::new(3, 0, 0));
        assert_eq!(target.library("Lib").unwrap().kind, LibraryKind::Package);
    }

    #[test]
    fn test_filtered_assets() {
        let groups = AssetGroups {
            compile: vec!["ref/net8.0/A.dll".to_string()],
            runtime: vec!["lib/net8.0/A.dll".to_string()],
            ..Default::default()
        };
        let filtered = groups.filtered(AssetFlags::RUNTIME);
        assert!(filtered.compile.is_empty());
        assert_eq!(filtered.runtime.len(), 1);
    }
}
