//! Lockstep restore engine
//!
//! Turns a [`DependencyGraphSpec`](lockstep_model::DependencyGraphSpec) into
//! exact package versions per project and target framework, then persists the
//! decision:
//! - `project.assets.json`, the asset manifest build tooling consumes
//! - `packages.lock.json`, the reviewable pin file
//! - `<project>.restore.cache`, the no-op fingerprint
//!
//! # Example
//!
//! ```no_run
//! use lockstep_config::{PackageSource, RestoreSettings};
//! use lockstep_core::{RestoreRunner, StaticProvider, StaticProviderFactory};
//! use lockstep_model::DependencyGraphSpec;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(graph: DependencyGraphSpec) -> lockstep_core::RestoreResult<()> {
//! let source = PackageSource::new("local", "memory://local");
//! let factory = StaticProviderFactory::new().with_provider(StaticProvider::new(source.clone()));
//! let settings = RestoreSettings::new("/tmp/packages").with_sources(vec![source]);
//!
//! let runner = RestoreRunner::new(settings, Arc::new(factory));
//! for summary in runner.run(&graph, CancellationToken::new()).await? {
//!     println!("{}: {:?}", summary.project, summary.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asset_manifest;
pub mod content;
pub mod error;
pub mod fs;
pub mod graph;
pub mod integrity;
pub mod lockfile;
pub mod noop;
pub mod provider;
pub mod resolver;
pub mod restore;
pub mod summary;

pub use asset_manifest::{AssetManifest, LibraryEntry, ASSETS_FILE_NAME};
pub use content::{ContentCache, ContentError};
pub use error::{RestoreError, RestoreResult};
pub use graph::{
    AssetGroups, DependencyType, LibraryKind, ResolvedGraph, ResolvedLibrary, ResolvedTarget,
};
pub use lockfile::{LockEntry, LockFile, LockOutcome, LockReconciler, LockState, LockTarget};
pub use noop::{CacheFile, NoOpCache};
pub use provider::{
    PackageDependency, PackageInfo, PackageProvider, ProviderCache, ProviderError,
    ProviderFactory, ProviderResult, SourceRepository, StaticProvider, StaticProviderFactory,
};
pub use resolver::{Conflict, FrameworkResolution, GraphResolver, LockedVersions};
pub use restore::{restore, RestoreRunner};
pub use summary::{RestoreStatus, RestoreSummary};
