//! Shared fixtures for restore tests
//!
//! A [`Solution`] owns a temporary directory holding project folders and the
//! package cache, plus one in-memory package source named `local`.

#![allow(dead_code)]

use lockstep_config::{PackageSource, RestoreSettings};
use lockstep_core::{
    PackageInfo, RestoreRunner, RestoreSummary, StaticProvider, StaticProviderFactory,
};
use lockstep_model::{
    DependencyGraphSpec, FrameworkMoniker, LibraryDependency, LockPolicy, PackageSpec,
    ProjectReference, TargetFrameworkInfo, Version, VersionRange,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const NET8: &str = "net8.0";

pub fn tfm(s: &str) -> FrameworkMoniker {
    FrameworkMoniker::parse(s).unwrap()
}

pub fn range(s: &str) -> VersionRange {
    s.parse().unwrap()
}

pub fn version(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn package_dependency(id: &str, requested: &str) -> LibraryDependency {
    LibraryDependency::package(id, Some(range(requested)))
}

pub struct Solution {
    pub dir: TempDir,
    pub graph: DependencyGraphSpec,
    pub provider: Arc<StaticProvider>,
    factory: Arc<StaticProviderFactory>,
    source: PackageSource,
}

impl Solution {
    pub fn new() -> Self {
        let source = PackageSource::new("local", "memory://local");
        let factory = StaticProviderFactory::new().with_provider(StaticProvider::new(source.clone()));
        let provider = factory.get("local").unwrap();
        Self {
            dir: TempDir::new().unwrap(),
            graph: DependencyGraphSpec::new(),
            provider,
            factory: Arc::new(factory),
            source,
        }
    }

    pub fn packages_path(&self) -> PathBuf {
        self.dir.path().join("packages")
    }

    /// A spec targeting net8.0, not yet added to the graph
    pub fn project(&self, name: &str) -> PackageSpec {
        let mut spec = PackageSpec::new(name, self.dir.path().join("src").join(name));
        spec.frameworks.push(TargetFrameworkInfo::new(tfm(NET8)));
        spec
    }

    /// Add a spec to the graph and to the restore list
    pub fn add(&mut self, spec: PackageSpec) {
        let name = spec.unique_name().to_string();
        self.graph.add_project(spec);
        self.graph.add_restore(name);
    }

    /// Add a spec that is known to the graph but not restored itself
    pub fn add_out_of_session(&mut self, spec: PackageSpec) {
        self.graph.add_project(spec);
    }

    pub fn spec_mut(&mut self, name: &str) -> &mut PackageSpec {
        self.graph.projects.get_mut(name).unwrap()
    }

    pub fn framework_mut(&mut self, name: &str) -> &mut TargetFrameworkInfo {
        &mut self.spec_mut(name).frameworks[0]
    }

    pub fn set_lock_policy(&mut self, name: &str, policy: LockPolicy) {
        self.spec_mut(name).restore_metadata.lock_policy = policy;
    }

    pub fn reference(&mut self, from: &str, to: &str) {
        self.framework_mut(from)
            .project_references
            .push(ProjectReference::new(to));
    }

    /// Publish a package with one netstandard2.0 assembly and the given
    /// dependencies
    pub fn publish(&self, id: &str, v: &str, dependencies: &[(&str, &str)]) {
        let info = self.package(id, v, dependencies);
        self.publish_info(info);
    }

    pub fn package(&self, id: &str, v: &str, dependencies: &[(&str, &str)]) -> PackageInfo {
        let mut info = PackageInfo::new(id, version(v))
            .with_files([format!("lib/netstandard2.0/{}.dll", id)]);
        for (dependency, requested) in dependencies {
            info = info.with_dependency(tfm("netstandard2.0"), *dependency, range(requested));
        }
        info
    }

    pub fn publish_info(&self, info: PackageInfo) {
        let content = format!("{}@{}", info.id, info.version).into_bytes();
        self.provider.add_package(info, content);
    }

    pub fn settings(&self) -> RestoreSettings {
        RestoreSettings::new(self.packages_path()).with_sources(vec![self.source.clone()])
    }

    pub fn runner(&self) -> RestoreRunner {
        self.runner_with(self.settings())
    }

    pub fn runner_with(&self, settings: RestoreSettings) -> RestoreRunner {
        RestoreRunner::new(settings, self.factory.clone())
    }

    pub async fn restore(&self) -> Vec<RestoreSummary> {
        self.runner()
            .run(&self.graph, CancellationToken::new())
            .await
            .unwrap()
    }

    pub async fn restore_one(&self) -> RestoreSummary {
        let mut summaries = self.restore().await;
        assert_eq!(summaries.len(), 1);
        summaries.remove(0)
    }

    pub fn spec(&self, name: &str) -> &PackageSpec {
        self.graph.project(name).unwrap()
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        lockstep_core::lockfile::lock_file_path(self.spec(name))
    }

    pub fn assets_path(&self, name: &str) -> PathBuf {
        lockstep_core::asset_manifest::assets_file_path(self.spec(name))
    }

    pub fn cache_path(&self, name: &str) -> PathBuf {
        lockstep_core::NoOpCache::cache_path(self.spec(name))
    }

    /// Forget the no-op fingerprint so the next restore runs in full
    pub fn forget_noop(&self, name: &str) {
        let _ = std::fs::remove_file(self.cache_path(name));
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

pub fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}
