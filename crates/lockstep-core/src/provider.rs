//! Package providers
//!
//! A provider answers three questions for one package source: which versions
//! of an id exist, what a given version declares (dependency groups, files,
//! development flag), and what its bytes are. How a provider talks to its
//! source is outside this crate; [`StaticProvider`] is the in-memory provider
//! used by tests and embedders.

use async_trait::async_trait;
use lockstep_config::PackageSource;
use lockstep_model::{AssetFlags, FrameworkMoniker, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod cache;
pub mod memory;
pub mod repository;

pub use cache::ProviderCache;
pub use memory::{StaticProvider, StaticProviderFactory};
pub use repository::{PackageLocation, SourceRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Package {id} {version} was not found in '{source_name}'")]
    PackageNotFound {
        source_name: String,
        id: String,
        version: Version,
    },

    #[error("No provider can be built for '{source_name}': {reason}")]
    Construction { source_name: String, reason: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A dependency declared inside a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDependency {
    pub id: String,
    pub range: VersionRange,
    #[serde(default, skip_serializing_if = "AssetFlags::is_empty")]
    pub exclude: AssetFlags,
}

/// Dependencies a package declares for one target framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGroup {
    pub framework: FrameworkMoniker,
    pub dependencies: Vec<PackageDependency>,
}

/// Metadata of one package version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub id: String,
    pub version: Version,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
    #[serde(default)]
    pub development_dependency: bool,
    /// Archive-relative file paths, `/` separated
    #[serde(default)]
    pub files: Vec<String>,
}

impl PackageInfo {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            dependency_groups: Vec::new(),
            development_dependency: false,
            files: Vec::new(),
        }
    }

    pub fn with_dependency(
        mut self,
        framework: FrameworkMoniker,
        id: impl Into<String>,
        range: VersionRange,
    ) -> Self {
        let dependency = PackageDependency {
            id: id.into(),
            range,
            exclude: AssetFlags::NONE,
        };
        match self
            .dependency_groups
            .iter_mut()
            .find(|g| g.framework == framework)
        {
            Some(group) => group.dependencies.push(dependency),
            None => self.dependency_groups.push(DependencyGroup {
                framework,
                dependencies: vec![dependency],
            }),
        }
        self
    }

    pub fn development(mut self) -> Self {
        self.development_dependency = true;
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    /// Dependencies of the group nearest to `framework`; none when no group applies
    pub fn dependencies_for(&self, framework: &FrameworkMoniker) -> &[PackageDependency] {
        let nearest = framework.nearest(self.dependency_groups.iter().map(|g| &g.framework));
        nearest
            .and_then(|found| self.dependency_groups.iter().find(|g| &g.framework == found))
            .map(|g| g.dependencies.as_slice())
            .unwrap_or(&[])
    }
}

/// One package source's view of the package world
#[async_trait]
pub trait PackageProvider: Send + Sync {
    fn source(&self) -> &PackageSource;

    /// Every version of `id` the source offers, any order
    async fn list_versions(&self, id: &str) -> ProviderResult<Vec<Version>>;

    /// Metadata for `id` at `version`, `None` when the source lacks it
    async fn package_info(&self, id: &str, version: &Version)
        -> ProviderResult<Option<PackageInfo>>;

    /// The package archive bytes
    async fn fetch_content(&self, id: &str, version: &Version) -> ProviderResult<Vec<u8>>;
}

/// Builds providers for configured sources
pub trait ProviderFactory: Send + Sync {
    fn create(&self, source: &PackageSource) -> ProviderResult<Arc<dyn PackageProvider>>;
}
