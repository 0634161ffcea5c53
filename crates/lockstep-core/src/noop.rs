//! No-op restore detection
//!
//! A project's fingerprint covers the canonical JSON of its whole project
//! closure, the effective source list and restore settings, and the size and
//! modification time of its output files. A matching fingerprint from a
//! successful previous restore lets the runner skip resolution entirely.
//!
//! Writers bump a generation counter published through a watch channel, so
//! interested parties can observe cache changes without hooking into the
//! resolver.

use crate::asset_manifest::assets_file_path;
use crate::error::{RestoreError, RestoreResult};
use crate::fs;
use crate::integrity::content_hash;
use crate::lockfile::lock_file_path;
use chrono::{DateTime, Utc};
use lockstep_config::RestoreSettings;
use lockstep_model::{DependencyGraphSpec, Diagnostic, PackageSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::sync::watch;
use tracing::debug;

/// Persisted no-op cache entry of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFile {
    pub version: u32,
    pub fingerprint: String,
    pub success: bool,
    pub project_path: PathBuf,
    #[serde(default)]
    pub expected_package_files: Vec<PathBuf>,
    /// Warnings replayed on a no-op restore
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub restored_at: DateTime<Utc>,
}

impl CacheFile {
    pub const VERSION: u32 = 1;

    pub fn new(spec: &PackageSpec, fingerprint: String, success: bool) -> Self {
        Self {
            version: Self::VERSION,
            fingerprint,
            success,
            project_path: spec.restore_metadata.project_path.clone(),
            expected_package_files: Vec::new(),
            diagnostics: Vec::new(),
            restored_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    graph: String,
    sources: Vec<String>,
    source_selection: String,
    force_locked_mode: bool,
    packages_path: &'a Path,
    outputs: Vec<OutputState>,
}

#[derive(Serialize)]
struct OutputState {
    path: PathBuf,
    len: Option<u64>,
    modified: Option<(u64, u32)>,
}

impl OutputState {
    fn of(path: PathBuf) -> Self {
        let metadata = std::fs::metadata(&path).ok();
        let modified = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| (d.as_secs(), d.subsec_nanos()));
        Self {
            len: metadata.map(|m| m.len()),
            modified,
            path,
        }
    }
}

/// No-op cache for one restore invocation
pub struct NoOpCache {
    generation: watch::Sender<u64>,
}

impl Default for NoOpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NoOpCache {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { generation }
    }

    /// Observe cache writes and invalidations
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn cache_path(spec: &PackageSpec) -> PathBuf {
        spec.restore_metadata
            .output_path
            .join(format!("{}.restore.cache", spec.name))
    }

    /// Fingerprint of everything a restore of `spec` depends on
    pub fn fingerprint(
        graph: &DependencyGraphSpec,
        spec: &PackageSpec,
        settings: &RestoreSettings,
    ) -> RestoreResult<String> {
        let closure = graph.with_project_closure(spec.unique_name())?;
        let input = FingerprintInput {
            graph: closure
                .canonical_json()
                .map_err(|e| RestoreError::json("graph spec", e))?,
            sources: settings
                .sources
                .iter()
                .filter(|s| s.enabled)
                .map(|s| s.cache_key())
                .collect(),
            source_selection: format!("{:?}", settings.source_selection),
            force_locked_mode: settings.force_locked_mode,
            packages_path: &settings.packages_path,
            outputs: vec![
                OutputState::of(assets_file_path(spec)),
                OutputState::of(lock_file_path(spec)),
            ],
        };
        let json =
            serde_json::to_string(&input).map_err(|e| RestoreError::json("fingerprint", e))?;
        Ok(content_hash(json.as_bytes()))
    }

    /// The cached entry when `fingerprint` allows skipping the restore
    pub fn check(&self, spec: &PackageSpec, fingerprint: &str) -> RestoreResult<Option<CacheFile>> {
        let path = Self::cache_path(spec);
        let Some(content) = fs::read_optional(&path)? else {
            return Ok(None);
        };
        let cache: CacheFile = match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "ignoring unreadable restore cache");
                return Ok(None);
            }
        };

        if cache.version != CacheFile::VERSION || !cache.success || cache.fingerprint != fingerprint
        {
            return Ok(None);
        }
        if let Some(missing) = cache.expected_package_files.iter().find(|f| !f.is_file()) {
            debug!(project = %spec.name, file = %missing.display(), "cached package is gone");
            return Ok(None);
        }
        Ok(Some(cache))
    }

    pub fn write(&self, spec: &PackageSpec, cache: &CacheFile) -> RestoreResult<()> {
        let json = serde_json::to_string_pretty(cache)
            .map_err(|e| RestoreError::json("restore cache", e))?;
        fs::write_atomic(&Self::cache_path(spec), json.as_bytes())?;
        self.generation.send_modify(|g| *g += 1);
        Ok(())
    }

    /// Remove the cache entry; returns whether one existed
    pub fn invalidate(&self, spec: &PackageSpec) -> RestoreResult<bool> {
        let path = Self::cache_path(spec);
        let removed = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(RestoreError::io(&path, e)),
        };
        self.generation.send_modify(|g| *g += 1);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_config::PackageSource;
    use lockstep_model::{FrameworkMoniker, LibraryDependency, ProjectReference, TargetFrameworkInfo};
    use tempfile::TempDir;

    fn project(dir: &Path, name: &str, references: &[&str]) -> PackageSpec {
        let mut spec = PackageSpec::new(name, dir.join(name));
        let mut tfi = TargetFrameworkInfo::new(FrameworkMoniker::parse("net8.0").unwrap());
        tfi.project_references = references.iter().map(|r| ProjectReference::new(*r)).collect();
        spec.frameworks.push(tfi);
        spec
    }

    fn setup(dir: &Path) -> (DependencyGraphSpec, RestoreSettings) {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project(dir, "App", &["Lib"]));
        graph.add_project(project(dir, "Lib", &[]));
        graph.add_restore("App");
        let settings = RestoreSettings::new(dir.join("packages"))
            .with_sources(vec![PackageSource::new("local", "memory://local")]);
        (graph, settings)
    }

    #[test]
    fn test_fingerprint_covers_referenced_projects() {
        let dir = TempDir::new().unwrap();
        let (mut graph, settings) = setup(dir.path());
        let app = graph.project("App").unwrap().clone();
        let before = NoOpCache::fingerprint(&graph, &app, &settings).unwrap();
        assert_eq!(before, NoOpCache::fingerprint(&graph, &app, &settings).unwrap());

        let lib = graph.projects.get_mut("Lib").unwrap();
        lib.frameworks[0]
            .dependencies
            .push(LibraryDependency::package("A", Some("1.0.0".parse().unwrap())));
        assert_ne!(before, NoOpCache::fingerprint(&graph, &app, &settings).unwrap());
    }

    #[test]
    fn test_fingerprint_covers_sources_and_outputs() {
        let dir = TempDir::new().unwrap();
        let (graph, settings) = setup(dir.path());
        let app = graph.project("App").unwrap().clone();
        let before = NoOpCache::fingerprint(&graph, &app, &settings).unwrap();

        let other = settings
            .clone()
            .with_sources(vec![PackageSource::new("remote", "https://remote")]);
        assert_ne!(before, NoOpCache::fingerprint(&graph, &app, &other).unwrap());

        fs::write_atomic(&assets_file_path(&app), b"{}").unwrap();
        assert_ne!(before, NoOpCache::fingerprint(&graph, &app, &settings).unwrap());
    }

    #[test]
    fn test_check_requires_success_and_package_files() {
        let dir = TempDir::new().unwrap();
        let (graph, _) = setup(dir.path());
        let app = graph.project("App").unwrap().clone();
        let cache = NoOpCache::new();
        let package = dir.path().join("a.pkg");

        let mut entry = CacheFile::new(&app, "abc".to_string(), true);
        entry.expected_package_files.push(package.clone());
        cache.write(&app, &entry).unwrap();
        assert!(cache.check(&app, "abc").unwrap().is_none());

        std::fs::write(&package, b"x").unwrap();
        assert!(cache.check(&app, "abc").unwrap().is_some());
        assert!(cache.check(&app, "other").unwrap().is_none());

        cache.write(&app, &CacheFile::new(&app, "abc".to_string(), false)).unwrap();
        assert!(cache.check(&app, "abc").unwrap().is_none());
    }

    #[test]
    fn test_generation_bumps_on_write_and_invalidate() {
        let dir = TempDir::new().unwrap();
        let (graph, _) = setup(dir.path());
        let app = graph.project("App").unwrap().clone();
        let cache = NoOpCache::new();
        let mut receiver = cache.subscribe();

        cache.write(&app, &CacheFile::new(&app, "abc".to_string(), true)).unwrap();
        assert_eq!(cache.generation(), 1);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), 1);

        assert!(cache.invalidate(&app).unwrap());
        assert!(!cache.invalidate(&app).unwrap());
        assert_eq!(*receiver.borrow_and_update(), 3);
    }
}
