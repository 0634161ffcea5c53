//! Provider cache shared by every project of one restore
//!
//! Providers are built at most once per (source, settings) key. Version lists
//! and package metadata are memoized per source in single-assignment cells, so
//! concurrent lookups of the same key wait for one request instead of racing.

use super::{PackageInfo, PackageProvider, ProviderError, ProviderFactory, ProviderResult};
use lockstep_config::PackageSource;
use semver::Version;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

type Cell<T> = Arc<OnceCell<T>>;
type CellMap<K, T> = Mutex<HashMap<K, Cell<T>>>;

pub struct ProviderCache {
    factory: Arc<dyn ProviderFactory>,
    settings_key: String,
    providers: CellMap<(String, String), Arc<dyn PackageProvider>>,
    versions: CellMap<(String, String), Arc<Vec<Version>>>,
    infos: CellMap<(String, String, Version), Option<Arc<PackageInfo>>>,
    constructed: AtomicUsize,
}

fn cell<K: Eq + Hash, T>(map: &CellMap<K, T>, key: K) -> Cell<T> {
    let mut guard = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.entry(key).or_default().clone()
}

impl ProviderCache {
    pub fn new(factory: Arc<dyn ProviderFactory>, settings_key: impl Into<String>) -> Self {
        Self {
            factory,
            settings_key: settings_key.into(),
            providers: Mutex::new(HashMap::new()),
            versions: Mutex::new(HashMap::new()),
            infos: Mutex::new(HashMap::new()),
            constructed: AtomicUsize::new(0),
        }
    }

    /// Number of providers built so far
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub async fn provider(&self, source: &PackageSource) -> ProviderResult<Arc<dyn PackageProvider>> {
        let slot = cell(
            &self.providers,
            (source.cache_key(), self.settings_key.clone()),
        );
        slot.get_or_try_init(|| async {
            debug!(source = %source, "building package provider");
            let provider = self.factory.create(source)?;
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderError>(provider)
        })
        .await
        .cloned()
    }

    /// Sorted, deduplicated versions of `id` in `source`
    pub async fn list_versions(
        &self,
        source: &PackageSource,
        id: &str,
    ) -> ProviderResult<Arc<Vec<Version>>> {
        let slot = cell(&self.versions, (source.cache_key(), id.to_string()));
        slot.get_or_try_init(|| async {
            let provider = self.provider(source).await?;
            let mut versions = provider.list_versions(id).await?;
            versions.sort();
            versions.dedup();
            debug!(source = %source.name, id, count = versions.len(), "listed versions");
            Ok::<_, ProviderError>(Arc::new(versions))
        })
        .await
        .cloned()
    }

    pub async fn package_info(
        &self,
        source: &PackageSource,
        id: &str,
        version: &Version,
    ) -> ProviderResult<Option<Arc<PackageInfo>>> {
        let slot = cell(
            &self.infos,
            (source.cache_key(), id.to_string(), version.clone()),
        );
        slot.get_or_try_init(|| async {
            let provider = self.provider(source).await?;
            Ok::<_, ProviderError>(provider.package_info(id, version).await?.map(Arc::new))
        })
        .await
        .cloned()
    }
}
