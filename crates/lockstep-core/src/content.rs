//! Local content cache
//!
//! Layout: `<root>/<id lowercase>/<version>/<id lowercase>.<version>.pkg`.
//! Hashes are not cached on disk; integrity checks always read the archive.

use crate::error::{RestoreError, RestoreResult};
use crate::fs;
use crate::lockfile::PackageKey;
use crate::provider::{PackageLocation, ProviderError, SourceRepository};
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Restore(#[from] RestoreError),
}

/// Package archives on disk, shared by every project of one restore
pub struct ContentCache {
    root: PathBuf,
    installs: Mutex<HashMap<PackageKey, Arc<OnceCell<()>>>>,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            installs: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, id: &str, version: &Version) -> PathBuf {
        self.root.join(id.to_lowercase()).join(version.to_string())
    }

    pub fn package_file(&self, id: &str, version: &Version) -> PathBuf {
        self.package_dir(id, version)
            .join(format!("{}.{}.pkg", id.to_lowercase(), version))
    }

    pub fn contains(&self, id: &str, version: &Version) -> bool {
        self.package_file(id, version).is_file()
    }

    /// Install the located package unless it is already on disk.
    ///
    /// Concurrent callers for the same package share one download. Returns
    /// `true` only for the call that actually wrote the archive.
    pub async fn ensure(
        &self,
        repository: &SourceRepository,
        location: &PackageLocation,
    ) -> Result<bool, ContentError> {
        let key = (location.info.id.clone(), location.info.version.clone());
        let cell = {
            let mut installs = self
                .installs
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            installs.entry(key).or_default().clone()
        };

        let installed = AtomicBool::new(false);
        let installed_flag = &installed;
        cell.get_or_try_init(|| async move {
            let id = &location.info.id;
            let version = &location.info.version;
            if self.contains(id, version) {
                return Ok::<(), ContentError>(());
            }

            let bytes = repository.fetch_content(location).await?;
            let package_file = self.package_file(id, version);
            tokio::task::spawn_blocking(move || -> RestoreResult<()> {
                fs::write_atomic(&package_file, &bytes)
            })
            .await
            .map_err(|e| RestoreError::Task(e.to_string()))??;

            debug!(id = %id, %version, source = %location.source.name, "installed package");
            installed_flag.store(true, Ordering::Relaxed);
            Ok(())
        })
        .await?;
        Ok(installed.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{PackageInfo, ProviderCache, StaticProvider, StaticProviderFactory};
    use lockstep_config::{PackageSource, SourceSelection};
    use tempfile::TempDir;

    fn repository(provider: StaticProvider) -> (SourceRepository, Arc<StaticProviderFactory>) {
        let source = PackageSource::new("local", "memory://local");
        let factory = Arc::new(StaticProviderFactory::new().with_provider(provider));
        let cache = Arc::new(ProviderCache::new(factory.clone(), "test"));
        (
            SourceRepository::new(cache, vec![source], SourceSelection::HighestVersion),
            factory,
        )
    }

    #[test]
    fn test_layout_lowercases_id() {
        let cache = ContentCache::new("/cache");
        let version = Version::new(1, 2, 3);
        assert_eq!(
            cache.package_file("Newtonsoft.Json", &version),
            PathBuf::from("/cache/newtonsoft.json/1.2.3/newtonsoft.json.1.2.3.pkg")
        );
    }

    #[tokio::test]
    async fn test_concurrent_installs_download_once() {
        let provider = StaticProvider::new(PackageSource::new("local", "memory://local"));
        provider.add_package(PackageInfo::new("A", Version::new(1, 0, 0)), b"archive".to_vec());
        let (repo, factory) = repository(provider);
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());

        let location = repo.locate("A", &Version::new(1, 0, 0)).await.unwrap().unwrap();
        let (first, second) = tokio::join!(
            cache.ensure(&repo, &location),
            cache.ensure(&repo, &location)
        );

        let installs = [first.unwrap(), second.unwrap()];
        assert_eq!(installs.iter().filter(|i| **i).count(), 1);
        assert_eq!(factory.get("local").unwrap().fetch_count(), 1);

        let file = cache.package_file("A", &Version::new(1, 0, 0));
        assert_eq!(std::fs::read(&file).unwrap(), b"archive");
        let entries: Vec<_> = std::fs::read_dir(cache.package_dir("A", &Version::new(1, 0, 0)))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["a.1.0.0.pkg"]);
    }

    #[tokio::test]
    async fn test_existing_package_is_not_fetched() {
        let provider = StaticProvider::new(PackageSource::new("local", "memory://local"));
        provider.add_package(PackageInfo::new("A", Version::new(1, 0, 0)), b"new".to_vec());
        let (repo, factory) = repository(provider);
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        let file = cache.package_file("A", &Version::new(1, 0, 0));
        fs::write_atomic(&file, b"old").unwrap();

        let location = repo.locate("A", &Version::new(1, 0, 0)).await.unwrap().unwrap();
        assert!(!cache.ensure(&repo, &location).await.unwrap());
        assert_eq!(factory.get("local").unwrap().fetch_count(), 0);
        assert_eq!(std::fs::read(&file).unwrap(), b"old");
    }
}
