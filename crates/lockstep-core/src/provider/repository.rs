//! Multi-source view over the provider cache

use super::{PackageInfo, ProviderCache, ProviderResult};
use futures::future::try_join_all;
use lockstep_config::{PackageSource, SourceSelection};
use semver::Version;
use std::sync::Arc;
use tracing::debug;

/// Where a package version was found
#[derive(Debug, Clone)]
pub struct PackageLocation {
    pub source: PackageSource,
    pub info: Arc<PackageInfo>,
}

/// The ordered source list of one restore, merged under a [`SourceSelection`]
pub struct SourceRepository {
    cache: Arc<ProviderCache>,
    sources: Vec<PackageSource>,
    selection: SourceSelection,
}

impl SourceRepository {
    pub fn new(
        cache: Arc<ProviderCache>,
        sources: Vec<PackageSource>,
        selection: SourceSelection,
    ) -> Self {
        Self {
            cache,
            sources: sources.into_iter().filter(|s| s.enabled).collect(),
            selection,
        }
    }

    pub fn sources(&self) -> &[PackageSource] {
        &self.sources
    }

    pub fn selection(&self) -> SourceSelection {
        self.selection
    }

    /// Candidate versions of `id`, ascending
    pub async fn list_versions(&self, id: &str) -> ProviderResult<Vec<Version>> {
        match self.selection {
            SourceSelection::HighestVersion => {
                let lists = try_join_all(
                    self.sources
                        .iter()
                        .map(|source| self.cache.list_versions(source, id)),
                )
                .await?;
                let mut merged: Vec<Version> =
                    lists.iter().flat_map(|l| l.iter().cloned()).collect();
                merged.sort();
                merged.dedup();
                Ok(merged)
            }
            SourceSelection::SourceOrder => Ok(self
                .authoritative_source(id)
                .await?
                .map(|(_, versions)| versions.as_ref().clone())
                .unwrap_or_default()),
        }
    }

    /// Find the source serving `id` at `version` and its metadata
    pub async fn locate(&self, id: &str, version: &Version) -> ProviderResult<Option<PackageLocation>> {
        let candidates: Vec<&PackageSource> = match self.selection {
            SourceSelection::HighestVersion => self.sources.iter().collect(),
            SourceSelection::SourceOrder => match self.authoritative_source(id).await? {
                Some((source, _)) => vec![source],
                None => Vec::new(),
            },
        };

        for source in candidates {
            let versions = self.cache.list_versions(source, id).await?;
            if versions.binary_search(version).is_err() {
                continue;
            }
            if let Some(info) = self.cache.package_info(source, id, version).await? {
                debug!(id, %version, source = %source.name, "located package");
                return Ok(Some(PackageLocation {
                    source: source.clone(),
                    info,
                }));
            }
        }
        Ok(None)
    }

    /// Download archive bytes from the source that served the metadata
    pub async fn fetch_content(&self, location: &PackageLocation) -> ProviderResult<Vec<u8>> {
        let provider = self.cache.provider(&location.source).await?;
        provider
            .fetch_content(&location.info.id, &location.info.version)
            .await
    }

    /// First source, in order, listing any version of `id`
    async fn authoritative_source(
        &self,
        id: &str,
    ) -> ProviderResult<Option<(&PackageSource, Arc<Vec<Version>>)>> {
        for source in &self.sources {
            let versions = self.cache.list_versions(source, id).await?;
            if !versions.is_empty() {
                return Ok(Some((source, versions)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StaticProvider, StaticProviderFactory};

    fn repository(selection: SourceSelection) -> SourceRepository {
        let first = PackageSource::new("first", "memory://first");
        let second = PackageSource::new("second", "memory://second");

        let a = StaticProvider::new(first.clone());
        a.add_package(PackageInfo::new("A", Version::new(1, 0, 0)), b"first".to_vec());
        let b = StaticProvider::new(second.clone());
        b.add_package(PackageInfo::new("A", Version::new(1, 0, 0)), b"second".to_vec());
        b.add_package(PackageInfo::new("A", Version::new(2, 0, 0)), b"second".to_vec());

        let factory = StaticProviderFactory::new().with_provider(a).with_provider(b);
        let cache = Arc::new(ProviderCache::new(Arc::new(factory), "test"));
        SourceRepository::new(cache, vec![first, second], selection)
    }

    #[tokio::test]
    async fn test_highest_version_merges_all_sources() {
        let repo = repository(SourceSelection::HighestVersion);
        let versions = repo.list_versions("A").await.unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0), Version::new(2, 0, 0)]);

        let location = repo.locate("A", &Version::new(2, 0, 0)).await.unwrap().unwrap();
        assert_eq!(location.source.name, "second");
    }

    #[tokio::test]
    async fn test_source_order_first_listing_wins() {
        let repo = repository(SourceSelection::SourceOrder);
        let versions = repo.list_versions("A").await.unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0)]);
        assert!(repo.locate("A", &Version::new(2, 0, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_from_located_source() {
        let repo = repository(SourceSelection::HighestVersion);
        let location = repo.locate("A", &Version::new(1, 0, 0)).await.unwrap().unwrap();
        assert_eq!(repo.fetch_content(&location).await.unwrap(), b"first");
    }
}
