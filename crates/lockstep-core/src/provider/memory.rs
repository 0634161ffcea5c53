//! In-memory providers

use super::{PackageInfo, PackageProvider, ProviderError, ProviderFactory, ProviderResult};
use async_trait::async_trait;
use lockstep_config::PackageSource;
use semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct StaticPackage {
    info: PackageInfo,
    content: Vec<u8>,
}

/// A provider serving packages registered at runtime
pub struct StaticProvider {
    source: PackageSource,
    packages: RwLock<BTreeMap<(String, Version), StaticPackage>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl StaticProvider {
    pub fn new(source: PackageSource) -> Self {
        Self {
            source,
            packages: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Register (or replace) a package version and its archive bytes
    pub fn add_package(&self, info: PackageInfo, content: Vec<u8>) {
        let key = (info.id.clone(), info.version.clone());
        let mut packages = self
            .packages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        packages.insert(key, StaticPackage { info, content });
    }

    /// Make every call fail as if the source could not be reached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of content downloads served
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> ProviderResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::SourceUnavailable {
                source_name: self.source.name.clone(),
                reason: "source is offline".to_string(),
            });
        }
        Ok(())
    }

    fn lookup(&self, id: &str, version: &Version) -> Option<StaticPackage> {
        let packages = self
            .packages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        packages.get(&(id.to_string(), version.clone())).cloned()
    }
}

#[async_trait]
impl PackageProvider for StaticProvider {
    fn source(&self) -> &PackageSource {
        &self.source
    }

    async fn list_versions(&self, id: &str) -> ProviderResult<Vec<Version>> {
        self.check_available()?;
        let packages = self
            .packages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(packages
            .keys()
            .filter(|(pkg, _)| pkg == id)
            .map(|(_, version)| version.clone())
            .collect())
    }

    async fn package_info(
        &self,
        id: &str,
        version: &Version,
    ) -> ProviderResult<Option<PackageInfo>> {
        self.check_available()?;
        Ok(self.lookup(id, version).map(|p| p.info))
    }

    async fn fetch_content(&self, id: &str, version: &Version) -> ProviderResult<Vec<u8>> {
        self.check_available()?;
        let package = self
            .lookup(id, version)
            .ok_or_else(|| ProviderError::PackageNotFound {
                source_name: self.source.name.clone(),
                id: id.to_string(),
                version: version.clone(),
            })?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(package.content)
    }
}

/// Hands out pre-registered [`StaticProvider`]s by source name
#[derive(Default)]
pub struct StaticProviderFactory {
    providers: HashMap<String, Arc<StaticProvider>>,
    created: AtomicUsize,
}

impl StaticProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: StaticProvider) -> Self {
        self.insert(Arc::new(provider));
        self
    }

    pub fn insert(&mut self, provider: Arc<StaticProvider>) {
        self.providers
            .insert(provider.source.name.clone(), provider);
    }

    pub fn get(&self, source_name: &str) -> Option<Arc<StaticProvider>> {
        self.providers.get(source_name).cloned()
    }

    /// Number of `create` calls that produced a provider
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for StaticProviderFactory {
    fn create(&self, source: &PackageSource) -> ProviderResult<Arc<dyn PackageProvider>> {
        let provider = self
            .providers
            .get(&source.name)
            .cloned()
            .ok_or_else(|| ProviderError::Construction {
                source_name: source.name.clone(),
                reason: "no provider registered for this source".to_string(),
            })?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(provider)
    }
}
