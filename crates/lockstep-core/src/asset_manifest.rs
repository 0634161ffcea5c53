//! Asset manifest (`project.assets.json`), the document build tooling reads
//!
//! One section per target framework lists its libraries in canonical order
//! (Direct, Transitive, Project) with their filtered asset groups. A
//! `libraries` section records where each package lives in the content cache
//! and `projects` where each referenced project file is; the two are keyed
//! separately so a package and a project may share an id. The originating
//! spec and diagnostics are echoed for consumers.

use crate::error::{RestoreError, RestoreResult};
use crate::fs;
use crate::graph::{LibraryKind, ResolvedGraph, ResolvedLibrary, ResolvedTarget};
use crate::lockfile::PackageKey;
use lockstep_model::{Diagnostic, FrameworkMoniker, PackageSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const ASSETS_FILE_NAME: &str = "project.assets.json";

pub fn assets_file_path(spec: &PackageSpec) -> PathBuf {
    spec.restore_metadata.output_path.join(ASSETS_FILE_NAME)
}

/// Where a library lives and how to verify it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    #[serde(rename = "type")]
    pub kind: LibraryKind,
    /// Cache-relative folder for packages, project file for projects
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub version: u32,
    pub targets: BTreeMap<FrameworkMoniker, Vec<ResolvedLibrary>>,
    /// Packages by `id/version`
    pub libraries: BTreeMap<String, LibraryEntry>,
    /// Referenced projects by `name/version`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub projects: BTreeMap<String, LibraryEntry>,
    pub project: PackageSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<Diagnostic>,
}

impl AssetManifest {
    pub const VERSION: u32 = 1;

    pub fn new(
        graph: &ResolvedGraph,
        project: &PackageSpec,
        hashes: &HashMap<PackageKey, String>,
        logs: Vec<Diagnostic>,
    ) -> Self {
        let mut libraries = BTreeMap::new();
        let mut projects = BTreeMap::new();
        for library in graph.targets.iter().flat_map(|t| t.libraries.iter()) {
            let section = if library.is_package() {
                &mut libraries
            } else {
                &mut projects
            };
            section
                .entry(library.key())
                .or_insert_with(|| library_entry(library, hashes));
        }

        Self {
            version: Self::VERSION,
            targets: graph
                .targets
                .iter()
                .map(|t| (t.framework.clone(), t.libraries.clone()))
                .collect(),
            libraries,
            projects,
            project: project.clone(),
            logs,
        }
    }

    /// The resolved graph this manifest was written from
    pub fn to_graph(&self) -> ResolvedGraph {
        ResolvedGraph::new(
            self.targets
                .iter()
                .map(|(framework, libraries)| {
                    ResolvedTarget::new(framework.clone(), libraries.clone())
                })
                .collect(),
        )
    }

    pub fn to_json(&self) -> RestoreResult<String> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| RestoreError::json("asset manifest", e))?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Write unless the file already holds the same bytes
    pub fn write(&self, path: &Path) -> RestoreResult<bool> {
        fs::write_if_changed(path, self.to_json()?.as_bytes())
    }

    pub fn read(path: &Path) -> RestoreResult<Option<Self>> {
        match fs::read_optional(path)? {
            Some(content) => Self::from_json(&content)
                .map(Some)
                .map_err(|e| RestoreError::json("asset manifest", e)),
            None => Ok(None),
        }
    }
}

fn library_entry(library: &ResolvedLibrary, hashes: &HashMap<PackageKey, String>) -> LibraryEntry {
    match library.kind {
        LibraryKind::Package => LibraryEntry {
            kind: LibraryKind::Package,
            path: format!("{}/{}", library.id.to_lowercase(), library.version),
            sha512: hashes
                .get(&(library.id.clone(), library.version.clone()))
                .cloned(),
        },
        LibraryKind::Project => LibraryEntry {
            kind: LibraryKind::Project,
            path: library.path.clone().unwrap_or_default(),
            sha512: None,
        },
    }
}
