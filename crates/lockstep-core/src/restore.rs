//! Solution-wide restore
//!
//! [`RestoreRunner::run`] restores every project named in a
//! [`DependencyGraphSpec`]'s `restore` list. Per project:
//!
//! 1. spec validation and closure checks
//! 2. no-op check against the previous fingerprint
//! 3. resolution of every target framework
//! 4. content installation into the local cache
//! 5. integrity validation against the lock file's recorded hashes
//! 6. lock file reconciliation
//! 7. asset manifest and lock file writes, only when nothing failed
//! 8. the no-op cache entry for the next run
//!
//! Problems with a project end up in its [`RestoreSummary`], disk failures
//! while restoring it included. Only API misuse, reference cycles and
//! failures before any project starts are `Err`.

use crate::asset_manifest::{assets_file_path, AssetManifest};
use crate::content::{ContentCache, ContentError};
use crate::error::{RestoreError, RestoreResult};
use crate::graph::ResolvedGraph;
use crate::integrity;
use crate::lockfile::{LockFile, LockReconciler, PackageKey};
use crate::noop::{CacheFile, NoOpCache};
use crate::provider::{ProviderCache, ProviderError, ProviderFactory, SourceRepository};
use crate::resolver::GraphResolver;
use crate::summary::RestoreSummary;
use futures::stream::{self, StreamExt};
use lockstep_config::RestoreSettings;
use lockstep_model::{DependencyGraphSpec, Diagnostic, ErrorCode, Validator};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared by the projects of one `run`
struct RunContext {
    graph: Arc<DependencyGraphSpec>,
    repository: Arc<SourceRepository>,
    content: Arc<ContentCache>,
    resolver: Arc<GraphResolver>,
    reconcilers: HashMap<String, LockReconciler>,
    cancel: CancellationToken,
}

/// Why installation stopped
enum InstallStop {
    Cancelled,
    Failed(RestoreError),
}

/// Runs restores against one configuration and provider factory
pub struct RestoreRunner {
    settings: RestoreSettings,
    factory: Arc<dyn ProviderFactory>,
    noop: Arc<NoOpCache>,
}

impl RestoreRunner {
    pub fn new(settings: RestoreSettings, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            settings,
            factory,
            noop: Arc::new(NoOpCache::new()),
        }
    }

    /// Share a no-op cache with other runners or observers
    pub fn with_noop_cache(mut self, noop: Arc<NoOpCache>) -> Self {
        self.noop = noop;
        self
    }

    pub fn settings(&self) -> &RestoreSettings {
        &self.settings
    }

    pub fn noop_cache(&self) -> &Arc<NoOpCache> {
        &self.noop
    }

    /// Restore every project in `graph.restore`; summaries follow that order
    pub async fn run(
        &self,
        graph: &DependencyGraphSpec,
        cancel: CancellationToken,
    ) -> RestoreResult<Vec<RestoreSummary>> {
        if let Some(unknown) = graph.restore.iter().find(|n| graph.project(n).is_none()) {
            return Err(RestoreError::UnknownProject(unknown.clone()));
        }
        graph.ensure_acyclic()?;

        let context = self.context(graph, cancel)?;

        let mut requested: Vec<&str> = Vec::new();
        for name in &graph.restore {
            if !requested.contains(&name.as_str()) {
                requested.push(name);
            }
        }
        let outcomes =
            futures::future::join_all(requested.iter().map(|name| self.restore_project(&context, name)))
                .await;

        let mut by_name: HashMap<&str, RestoreSummary> = HashMap::new();
        for (name, outcome) in requested.iter().zip(outcomes) {
            let summary = match outcome {
                Ok(summary) => summary,
                Err(err @ (RestoreError::UnknownProject(_) | RestoreError::GraphSpec(_))) => {
                    return Err(err)
                }
                Err(err) => {
                    warn!(project = %name, error = %err, "restore aborted");
                    let diagnostic = Diagnostic::new(ErrorCode::IoFailure, err.to_string());
                    RestoreSummary::finished(*name, false, 0, vec![diagnostic])
                }
            };
            by_name.insert(*name, summary);
        }
        Ok(graph
            .restore
            .iter()
            .filter_map(|name| by_name.get(name.as_str()).cloned())
            .collect())
    }

    fn context(&self, graph: &DependencyGraphSpec, cancel: CancellationToken) -> RestoreResult<RunContext> {
        let graph = Arc::new(graph.clone());
        let settings_key = format!(
            "{:?}|{}",
            self.settings.source_selection,
            self.settings.packages_path.display()
        );
        let providers = Arc::new(ProviderCache::new(Arc::clone(&self.factory), settings_key));
        let repository = Arc::new(SourceRepository::new(
            providers,
            self.settings.sources.clone(),
            self.settings.source_selection,
        ));

        let mut in_scope: BTreeSet<String> = BTreeSet::new();
        for name in &graph.restore {
            for spec in graph.closure(name)?.projects {
                in_scope.insert(spec.unique_name().to_string());
            }
        }

        let mut resolver = GraphResolver::new(
            Arc::clone(&graph),
            Arc::clone(&repository),
            self.settings.max_parallelism,
            cancel.clone(),
        );
        let mut reconcilers = HashMap::new();
        for name in in_scope {
            let Some(spec) = graph.project(&name) else {
                continue;
            };
            let reconciler = LockReconciler::load(spec, &graph, self.settings.force_locked_mode)?;
            if let Some(hints) = reconciler.hints() {
                resolver = resolver.with_locked_versions(name.clone(), hints);
            }
            reconcilers.insert(name, reconciler);
        }

        Ok(RunContext {
            content: Arc::new(ContentCache::new(&self.settings.packages_path)),
            resolver: Arc::new(resolver),
            graph,
            repository,
            reconcilers,
            cancel,
        })
    }

    async fn restore_project(&self, ctx: &RunContext, name: &str) -> RestoreResult<RestoreSummary> {
        let spec = ctx
            .graph
            .project(name)
            .ok_or_else(|| RestoreError::UnknownProject(name.to_string()))?;

        if let Err(errors) = Validator::validate(spec) {
            let diagnostics = errors
                .iter()
                .map(|e| Diagnostic::new(ErrorCode::InvalidSpec, e.to_string()).with_library(&spec.name))
                .collect();
            let summary = RestoreSummary::finished(name, false, 0, diagnostics);
            info!(project = %name, "project spec is invalid");
            return Ok(summary);
        }
        if ctx.cancel.is_cancelled() {
            return Ok(RestoreSummary::cancelled(name));
        }

        let fingerprint = NoOpCache::fingerprint(&ctx.graph, spec, &self.settings)?;
        if let Some(cached) = self.noop.check(spec, &fingerprint)? {
            info!(project = %name, "no-op restore");
            return Ok(RestoreSummary::finished(name, true, 0, cached.diagnostics));
        }

        let mut diagnostics: Vec<Diagnostic> = ctx
            .graph
            .closure(name)?
            .missing
            .into_iter()
            .filter(|m| m.from != name)
            .map(|m| {
                Diagnostic::new(
                    ErrorCode::MissingProjectReference,
                    format!(
                        "Project '{}' references '{}', which is not in the restore graph",
                        m.from, m.to
                    ),
                )
                .with_library(m.to)
            })
            .collect();

        let resolutions = ctx.resolver.resolve_project(name).await;
        if resolutions.iter().any(|r| r.cancelled) {
            info!(project = %name, "restore cancelled");
            return Ok(RestoreSummary::cancelled(name));
        }
        for resolution in &resolutions {
            diagnostics.extend(resolution.diagnostics.iter().cloned());
        }
        let graph = ResolvedGraph::new(resolutions.iter().map(|r| r.target.clone()).collect());

        let mut install_count = 0;
        let mut hashes: HashMap<PackageKey, String> = HashMap::new();
        if !has_errors(&diagnostics) {
            match self.install(ctx, &graph, &mut diagnostics).await {
                Ok(count) => install_count = count,
                Err(InstallStop::Cancelled) => return Ok(RestoreSummary::cancelled(name)),
                Err(InstallStop::Failed(err)) => return Err(err),
            }
        }
        if !has_errors(&diagnostics) {
            hashes = integrity::compute_hashes(ctx.content.clone(), graph.package_identities()).await?;
            if ctx.cancel.is_cancelled() {
                return Ok(RestoreSummary::cancelled(name));
            }
            let recorded = ctx
                .reconcilers
                .get(name)
                .and_then(|r| r.persisted())
                .map(LockFile::content_hashes)
                .unwrap_or_default();
            diagnostics.extend(integrity::validate(&recorded, &hashes));
        }

        let lock = LockFile::from_graph(&graph, &hashes);
        let outcome = ctx
            .reconcilers
            .get(name)
            .map(|r| r.reconcile(&lock))
            .unwrap_or_default();
        diagnostics.extend(outcome.diagnostics);

        let diagnostics = lockstep_model::normalize(diagnostics);
        let success = !has_errors(&diagnostics);
        if success {
            AssetManifest::new(&graph, spec, &hashes, diagnostics.clone())
                .write(&assets_file_path(spec))?;
            if outcome.write {
                if let Some(reconciler) = ctx.reconcilers.get(name) {
                    if lock.save(reconciler.path())? {
                        debug!(project = %name, path = %reconciler.path().display(), "lock file written");
                    }
                }
            }
        }

        let mut cache = CacheFile::new(
            spec,
            NoOpCache::fingerprint(&ctx.graph, spec, &self.settings)?,
            success,
        );
        cache.expected_package_files = graph
            .package_identities()
            .iter()
            .map(|(id, version)| ctx.content.package_file(id, version))
            .collect();
        cache.diagnostics = diagnostics.clone();
        self.noop.write(spec, &cache)?;

        let summary = RestoreSummary::finished(name, false, install_count, diagnostics);
        if summary.success {
            info!(project = %name, installed = install_count, "restore succeeded");
        } else {
            info!(project = %name, errors = ?summary.error_codes(), "restore failed");
        }
        Ok(summary)
    }

    /// Install every package of `graph` missing from the content cache
    async fn install(
        &self,
        ctx: &RunContext,
        graph: &ResolvedGraph,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<usize, InstallStop> {
        let results: Vec<Result<Result<bool, Diagnostic>, InstallStop>> =
            stream::iter(graph.package_identities())
                .map(|(id, version)| async move {
                    if ctx.cancel.is_cancelled() {
                        return Err(InstallStop::Cancelled);
                    }
                    let location = match ctx.repository.locate(&id, &version).await {
                        Ok(Some(location)) => location,
                        Ok(None) => {
                            return Ok(Err(Diagnostic::new(
                                ErrorCode::UnresolvedPackage,
                                format!("Package {} {} is no longer offered by any source", id, version),
                            )
                            .with_library(id)))
                        }
                        Err(err) => return Ok(Err(install_diagnostic(&err))),
                    };
                    match ctx.content.ensure(&ctx.repository, &location).await {
                        Ok(installed) => Ok(Ok(installed)),
                        Err(ContentError::Provider(err)) => Ok(Err(install_diagnostic(&err))),
                        Err(ContentError::Restore(err)) => Err(InstallStop::Failed(err)),
                    }
                })
                .buffer_unordered(self.settings.max_parallelism.max(1))
                .collect()
                .await;

        let mut installed = 0;
        for result in results {
            match result? {
                Ok(true) => installed += 1,
                Ok(false) => {}
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        if ctx.cancel.is_cancelled() {
            return Err(InstallStop::Cancelled);
        }
        Ok(installed)
    }
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

fn install_diagnostic(err: &ProviderError) -> Diagnostic {
    warn!(error = %err, "package download failed");
    match err {
        ProviderError::PackageNotFound { id, .. } => {
            Diagnostic::new(ErrorCode::UnresolvedPackage, err.to_string()).with_library(id)
        }
        _ => Diagnostic::new(ErrorCode::SourceUnavailable, err.to_string()),
    }
}

/// Convenience for a one-off restore with a fresh runner
pub async fn restore(
    graph: &DependencyGraphSpec,
    settings: RestoreSettings,
    factory: Arc<dyn ProviderFactory>,
    cancel: CancellationToken,
) -> RestoreResult<Vec<RestoreSummary>> {
    RestoreRunner::new(settings, factory).run(graph, cancel).await
}

