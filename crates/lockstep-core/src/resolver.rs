//! Graph resolver
//!
//! Resolves one (project, framework) pair at a time. Each pair is computed at
//! most once per restore and memoized in a single-assignment cell, so a project
//! referenced from several consumers is resolved once and every consumer waits
//! on the same result. Referenced projects are awaited before a parallelism
//! permit is taken; waiting never holds a permit.
//!
//! Package selection iterates to a fixed point: every round walks the
//! dependency groups of the currently selected versions, collects all ranges
//! requested for each id, and picks the highest version satisfying all of
//! them. Rounds stop once the selection no longer changes.

use crate::graph::{
    AssetGroups, DependencyType, LibraryKind, ResolvedLibrary, ResolvedTarget,
};
use crate::provider::{PackageLocation, ProviderError, SourceRepository};
use futures::future::{join_all, BoxFuture, FutureExt};
use lockstep_model::{
    normalize, AssetFlags, CentralVersion, DependencyGraphSpec, Diagnostic, ErrorCode,
    FrameworkMatch, FrameworkMoniker, PackageSpec, ProjectReference, TargetFrameworkInfo,
    VersionRange,
};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub mod assets;
pub mod conflict;
mod version_solver;

pub use conflict::{Conflict, ConflictingConstraint};
pub use version_solver::{Selection, VersionConstraint, VersionSolver};

/// Upper bound on selection rounds before giving up with a conflict
const MAX_ITERATIONS: usize = 100;

/// Versions pinned by a project's lock file, used as resolution hints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedVersions {
    /// Locked versions are mandatory rather than preferred
    pub enforce: bool,
    /// framework → package id → version
    pub frameworks: BTreeMap<FrameworkMoniker, BTreeMap<String, Version>>,
}

impl LockedVersions {
    pub fn version(&self, framework: &FrameworkMoniker, id: &str) -> Option<&Version> {
        self.frameworks.get(framework).and_then(|f| f.get(id))
    }
}

/// A package request a project passes on to the projects referencing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowingRequest {
    pub id: String,
    pub range: VersionRange,
    pub path: Vec<String>,
    pub flags: AssetFlags,
}

/// Result of resolving one project for one framework
#[derive(Debug, Clone)]
pub struct FrameworkResolution {
    pub project: String,
    pub target: ResolvedTarget,
    pub diagnostics: Vec<Diagnostic>,
    /// Requests that flow to consumers
    pub exports: Vec<FlowingRequest>,
    /// Project libraries that flow to consumers
    pub project_libraries: Vec<ResolvedLibrary>,
    pub cancelled: bool,
}

impl FrameworkResolution {
    fn failed(project: &str, framework: FrameworkMoniker, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            project: project.to_string(),
            target: ResolvedTarget::new(framework, Vec::new()),
            diagnostics: normalize(diagnostics),
            exports: Vec::new(),
            project_libraries: Vec::new(),
            cancelled: false,
        }
    }

    fn cancelled(project: &str, framework: FrameworkMoniker) -> Self {
        let diagnostic = Diagnostic::new(
            ErrorCode::Cancelled,
            format!("Resolution of '{}' was cancelled", project),
        )
        .with_framework(&framework);
        Self {
            cancelled: true,
            ..Self::failed(project, framework, vec![diagnostic])
        }
    }

    pub fn framework(&self) -> &FrameworkMoniker {
        &self.target.framework
    }

    pub fn success(&self) -> bool {
        !self.cancelled && !self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Why a resolution stopped early
enum Interrupt {
    Provider(ProviderError),
    Cancelled,
}

impl From<ProviderError> for Interrupt {
    fn from(err: ProviderError) -> Self {
        Interrupt::Provider(err)
    }
}

/// A starting request: a direct dependency or a request flowing in from a
/// referenced project
#[derive(Debug, Clone)]
struct Seed {
    id: String,
    range: VersionRange,
    path: Vec<String>,
    flags: AssetFlags,
    private_assets: AssetFlags,
    direct: bool,
    centrally_managed: bool,
    explicit_compile: bool,
}

/// One constraint-collection pass over the current selection
#[derive(Default)]
struct Walk {
    constraints: BTreeMap<String, Vec<VersionConstraint>>,
    /// Ids constrained by a central entry through transitive pinning
    pinned: BTreeSet<String>,
}

struct Round {
    selected: BTreeMap<String, Version>,
    failures: Vec<Diagnostic>,
}

/// A referenced project and its resolution for the matched framework
struct Referenced<'a> {
    reference: ProjectReference,
    spec: &'a PackageSpec,
    matched: FrameworkMatch,
    resolution: Arc<FrameworkResolution>,
}

type ResolutionCell = Arc<OnceCell<Arc<FrameworkResolution>>>;

/// Resolver shared by every project of one restore
///
/// Expects an acyclic graph (see
/// [`DependencyGraphSpec::ensure_acyclic`]); a project referencing itself is
/// reported rather than awaited.
pub struct GraphResolver {
    graph: Arc<DependencyGraphSpec>,
    repository: Arc<SourceRepository>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    locked: HashMap<String, LockedVersions>,
    solver: VersionSolver,
    cells: Mutex<HashMap<(String, FrameworkMoniker), ResolutionCell>>,
}

impl GraphResolver {
    pub fn new(
        graph: Arc<DependencyGraphSpec>,
        repository: Arc<SourceRepository>,
        max_parallelism: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            graph,
            repository,
            permits: Arc::new(Semaphore::new(max_parallelism.max(1))),
            cancel,
            locked: HashMap::new(),
            solver: VersionSolver::new(),
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Register lock file hints for a project
    pub fn with_locked_versions(mut self, unique_name: impl Into<String>, locked: LockedVersions) -> Self {
        self.locked.insert(unique_name.into(), locked);
        self
    }

    /// Resolve every framework of a project, ordered by framework
    pub async fn resolve_project(self: &Arc<Self>, unique_name: &str) -> Vec<Arc<FrameworkResolution>> {
        let Some(spec) = self.graph.project(unique_name) else {
            return Vec::new();
        };
        let mut resolutions = join_all(
            spec.frameworks
                .iter()
                .map(|f| self.resolve_framework(unique_name, &f.framework)),
        )
        .await;
        resolutions.sort_by(|a, b| a.framework().cmp(b.framework()));
        resolutions
    }

    /// Memoized resolution of one (project, framework) pair
    pub fn resolve_framework(
        self: &Arc<Self>,
        unique_name: &str,
        framework: &FrameworkMoniker,
    ) -> BoxFuture<'static, Arc<FrameworkResolution>> {
        let cell = self.cell(unique_name, framework);
        let this = Arc::clone(self);
        let unique_name = unique_name.to_string();
        let framework = framework.clone();
        async move {
            cell.get_or_init(|| this.compute(unique_name, framework))
                .await
                .clone()
        }
        .boxed()
    }

    fn cell(&self, unique_name: &str, framework: &FrameworkMoniker) -> ResolutionCell {
        let mut cells = self
            .cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cells
            .entry((unique_name.to_string(), framework.clone()))
            .or_default()
            .clone()
    }

    async fn compute(
        self: Arc<Self>,
        unique_name: String,
        framework: FrameworkMoniker,
    ) -> Arc<FrameworkResolution> {
        let Some(spec) = self.graph.project(&unique_name) else {
            let diagnostic = Diagnostic::new(
                ErrorCode::MissingProjectReference,
                format!("Project '{}' is not part of the restore graph", unique_name),
            );
            return Arc::new(FrameworkResolution::failed(&unique_name, framework, vec![diagnostic]));
        };
        let Some(tfi) = spec.framework(&framework) else {
            let diagnostic = Diagnostic::new(
                ErrorCode::IncompatibleFramework,
                format!("Project '{}' does not target {}", spec.name, framework),
            )
            .with_framework(&framework);
            return Arc::new(FrameworkResolution::failed(&unique_name, framework, vec![diagnostic]));
        };

        let mut diagnostics = Vec::new();
        let referenced = self
            .resolve_references(spec, tfi, &mut diagnostics)
            .await;

        if self.cancel.is_cancelled() {
            return Arc::new(FrameworkResolution::cancelled(&unique_name, framework));
        }
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return Arc::new(FrameworkResolution::cancelled(&unique_name, framework));
        };

        debug!(project = %unique_name, framework = %framework, "resolving packages");
        let outcome = self
            .resolve_packages(spec, tfi, &referenced, &mut diagnostics)
            .await;
        let resolution = match outcome {
            Ok((target, exports, project_libraries)) => FrameworkResolution {
                project: unique_name.clone(),
                target,
                diagnostics: normalize(diagnostics),
                exports,
                project_libraries,
                cancelled: false,
            },
            Err(Interrupt::Cancelled) => FrameworkResolution::cancelled(&unique_name, framework),
            Err(Interrupt::Provider(err)) => {
                warn!(project = %unique_name, error = %err, "package source failure");
                diagnostics.push(provider_diagnostic(&err, &framework));
                FrameworkResolution::failed(&unique_name, framework, diagnostics)
            }
        };
        debug!(
            project = %unique_name,
            framework = %resolution.framework(),
            libraries = resolution.target.libraries.len(),
            success = resolution.success(),
            "framework resolved"
        );
        Arc::new(resolution)
    }

    /// Await the resolutions of every project referenced for `tfi`
    async fn resolve_references<'a>(
        self: &'a Arc<Self>,
        spec: &'a PackageSpec,
        tfi: &'a TargetFrameworkInfo,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Referenced<'a>> {
        let framework = &tfi.framework;
        let mut pending = Vec::new();

        for reference in tfi.all_project_references() {
            let Some(target) = self.graph.resolve_reference(&reference.unique_name) else {
                diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::MissingProjectReference,
                        format!(
                            "Project '{}' references '{}', which is not in the restore graph",
                            spec.name, reference.unique_name
                        ),
                    )
                    .with_library(&reference.unique_name)
                    .with_framework(framework),
                );
                continue;
            };
            if target.unique_name() == spec.unique_name() {
                diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::InvalidSpec,
                        format!("Project '{}' references itself", spec.name),
                    )
                    .with_library(&spec.name)
                    .with_framework(framework),
                );
                continue;
            }

            let candidates = target.frameworks.iter().map(|f| &f.framework);
            let Some(matched) = framework.nearest_with_fallback(&tfi.imports, candidates) else {
                diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::IncompatibleFramework,
                        format!(
                            "Project '{}' has no framework compatible with {}",
                            target.name, framework
                        ),
                    )
                    .with_library(&target.name)
                    .with_framework(framework),
                );
                continue;
            };
            if matched.fallback {
                diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::FallbackFramework,
                        format!(
                            "Project '{}' was restored using {} instead of {}",
                            target.name, matched.framework, framework
                        ),
                    )
                    .with_library(&target.name)
                    .with_framework(framework),
                );
            }
            pending.push((reference, target, matched));
        }

        let resolutions = join_all(
            pending
                .iter()
                .map(|(_, target, matched)| self.resolve_framework(target.unique_name(), &matched.framework)),
        )
        .await;

        pending
            .into_iter()
            .zip(resolutions)
            .map(|((reference, target, matched), resolution)| Referenced {
                reference,
                spec: target,
                matched,
                resolution,
            })
            .collect()
    }

    async fn resolve_packages(
        &self,
        spec: &PackageSpec,
        tfi: &TargetFrameworkInfo,
        referenced: &[Referenced<'_>],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(ResolvedTarget, Vec<FlowingRequest>, Vec<ResolvedLibrary>), Interrupt> {
        let framework = &tfi.framework;
        let mut seeds = direct_seeds(spec, tfi, diagnostics);
        seeds.extend(flowing_seeds(spec, referenced));

        let pinning = (spec.restore_metadata.transitive_pinning && spec.uses_central_versions(tfi))
            .then_some(&tfi.central_versions);
        let locked = self.locked.get(spec.unique_name());

        let mut selected: BTreeMap<String, Version> = BTreeMap::new();
        let mut converged = None;
        let mut last_walk = Walk::default();
        let mut unsettled: BTreeSet<String> = BTreeSet::new();

        for iteration in 0..MAX_ITERATIONS {
            if self.cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            let walk = self
                .collect_constraints(spec, framework, &seeds, &selected, pinning)
                .await?;
            let round = self.select_round(framework, &walk, locked).await?;
            if round.selected == selected {
                debug!(project = %spec.name, framework = %framework, iteration, "selection settled");
                converged = Some((walk, round.failures));
                break;
            }
            unsettled = round
                .selected
                .iter()
                .filter(|(id, version)| selected.get(*id) != Some(*version))
                .map(|(id, _)| id.clone())
                .chain(selected.keys().filter(|id| !round.selected.contains_key(*id)).cloned())
                .collect();
            selected = round.selected;
            last_walk = walk;
        }

        let Some((walk, failures)) = converged else {
            for id in &unsettled {
                let constraints = last_walk.constraints.get(id).cloned().unwrap_or_default();
                let conflict = Conflict::new(
                    id.clone(),
                    constraints
                        .iter()
                        .map(ConflictingConstraint::from_version_constraint)
                        .collect(),
                );
                diagnostics.push(conflict.to_diagnostic(framework));
            }
            return Ok((ResolvedTarget::new(framework.clone(), Vec::new()), Vec::new(), Vec::new()));
        };
        diagnostics.extend(failures);

        let mut locations = BTreeMap::new();
        for (id, version) in &selected {
            match self.repository.locate(id, version).await? {
                Some(location) => {
                    locations.insert(id.clone(), location);
                }
                None => diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::UnresolvedPackage,
                        format!("No source provides metadata for '{}' {}", id, version),
                    )
                    .with_library(id)
                    .with_framework(framework),
                ),
            }
        }

        let explicit_compile: HashSet<&str> = seeds
            .iter()
            .filter(|s| s.direct && s.explicit_compile)
            .map(|s| s.id.as_str())
            .collect();
        let flags = propagate_flags(framework, &seeds, &locations, &explicit_compile);

        let mut libraries: Vec<ResolvedLibrary> = locations
            .iter()
            .map(|(id, location)| {
                package_library(
                    framework,
                    location,
                    seeds.iter().find(|s| s.direct && &s.id == id),
                    walk.pinned.contains(id),
                    effective_flags(id, location, &flags, &explicit_compile),
                )
            })
            .collect();

        diagnostics.extend(incompatible_packages(framework, &locations, &flags));

        let (project_libraries, exported_projects) = collect_project_libraries(referenced);
        libraries.extend(project_libraries);

        let exports = seeds
            .iter()
            .filter(|s| !s.private_assets.is_all())
            .filter(|s| {
                !locations
                    .get(&s.id)
                    .is_some_and(|l| l.info.development_dependency)
            })
            .map(|s| FlowingRequest {
                id: s.id.clone(),
                range: s.range.clone(),
                path: s.path.clone(),
                flags: s.flags - s.private_assets,
            })
            .collect();

        Ok((
            ResolvedTarget::new(framework.clone(), libraries),
            exports,
            exported_projects,
        ))
    }

    /// Walk from the seeds through the dependency groups of the selected
    /// versions, recording every requested range with its path
    async fn collect_constraints(
        &self,
        spec: &PackageSpec,
        framework: &FrameworkMoniker,
        seeds: &[Seed],
        selected: &BTreeMap<String, Version>,
        pinning: Option<&BTreeMap<String, CentralVersion>>,
    ) -> Result<Walk, Interrupt> {
        let mut walk = Walk::default();
        let mut first_path: HashMap<String, Vec<String>> = HashMap::new();
        let mut queue = VecDeque::new();

        for seed in seeds {
            walk.constraints
                .entry(seed.id.clone())
                .or_default()
                .push(VersionConstraint::new(seed.range.clone(), seed.path.clone()));
            if !first_path.contains_key(&seed.id) {
                first_path.insert(seed.id.clone(), seed.path.clone());
                queue.push_back(seed.id.clone());
            }
        }

        while let Some(id) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            let Some(version) = selected.get(&id) else {
                continue;
            };
            let Some(location) = self.repository.locate(&id, version).await? else {
                continue;
            };
            let parent_path = first_path.get(&id).cloned().unwrap_or_default();
            for dependency in location.info.dependencies_for(framework) {
                let mut path = parent_path.clone();
                path.push(dependency.id.clone());
                walk.constraints
                    .entry(dependency.id.clone())
                    .or_default()
                    .push(VersionConstraint::new(dependency.range.clone(), path.clone()));
                if !first_path.contains_key(&dependency.id) {
                    first_path.insert(dependency.id.clone(), path);
                    queue.push_back(dependency.id.clone());
                }
            }
        }

        if let Some(central) = pinning {
            let direct: HashSet<&str> = seeds
                .iter()
                .filter(|s| s.direct)
                .map(|s| s.id.as_str())
                .collect();
            for (id, constraints) in walk.constraints.iter_mut() {
                if direct.contains(id.as_str()) {
                    continue;
                }
                if let Some(entry) = central.get(id) {
                    constraints.push(VersionConstraint::new(
                        entry.range.clone(),
                        vec![spec.name.clone(), id.clone()],
                    ));
                    walk.pinned.insert(id.clone());
                }
            }
        }

        Ok(walk)
    }

    async fn select_round(
        &self,
        framework: &FrameworkMoniker,
        walk: &Walk,
        locked: Option<&LockedVersions>,
    ) -> Result<Round, Interrupt> {
        let mut round = Round {
            selected: BTreeMap::new(),
            failures: Vec::new(),
        };

        for (id, constraints) in &walk.constraints {
            let available = self.repository.list_versions(id).await?;
            let locked_version = locked.and_then(|l| l.version(framework, id));

            if let (Some(lock), Some(version)) = (locked, locked_version) {
                let usable = available.contains(version)
                    && VersionSolver::satisfies_all(version, constraints);
                if lock.enforce && !usable {
                    let requests: Vec<String> = constraints
                        .iter()
                        .map(|c| format!("{} {}", c.path_display(), c.range))
                        .collect();
                    round.failures.push(
                        Diagnostic::new(
                            ErrorCode::LockedModeViolation,
                            format!(
                                "'{}' is locked at {} but the project now requests {}",
                                id,
                                version,
                                requests.join("; ")
                            ),
                        )
                        .with_library(id)
                        .with_framework(framework),
                    );
                }
            }

            match self.solver.select(id, &available, constraints, locked_version) {
                Selection::Selected(version) => {
                    round.selected.insert(id.clone(), version);
                }
                Selection::NoVersions => round.failures.push(
                    Diagnostic::new(
                        ErrorCode::UnresolvedPackage,
                        format!("Unable to find package '{}' in any source", id),
                    )
                    .with_library(id)
                    .with_framework(framework),
                ),
                Selection::Unsatisfiable(constraint) => {
                    round.failures.push(constraint.unsatisfiable(id, framework))
                }
                Selection::Conflict(conflict) => {
                    round.failures.push(conflict.to_diagnostic(framework))
                }
            }
        }

        Ok(round)
    }
}

/// Seeds for the package dependencies a project declares, with central
/// versions applied
fn direct_seeds(
    spec: &PackageSpec,
    tfi: &TargetFrameworkInfo,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Seed> {
    let framework = &tfi.framework;
    let central = spec.uses_central_versions(tfi);
    let mut seeds = Vec::new();

    for dependency in tfi.package_dependencies() {
        let id = dependency.name();
        let chosen = if let Some(range) = &dependency.version_override {
            Some((range.clone(), false))
        } else if central {
            match (tfi.central_versions.get(id), dependency.range()) {
                (Some(entry), Some(declared)) if declared != &entry.range => {
                    diagnostics.push(
                        Diagnostic::new(
                            ErrorCode::CentralVersionConflict,
                            format!(
                                "'{}' declares {} but the central version is {}; use a version override to diverge",
                                id, declared, entry.range
                            ),
                        )
                        .with_library(id)
                        .with_framework(framework),
                    );
                    None
                }
                (Some(entry), _) => Some((entry.range.clone(), true)),
                (None, Some(declared)) => Some((declared.clone(), false)),
                (None, None) => {
                    diagnostics.push(
                        Diagnostic::new(
                            ErrorCode::MissingCentralVersion,
                            format!("'{}' has no central version and no version of its own", id),
                        )
                        .with_library(id)
                        .with_framework(framework),
                    );
                    None
                }
            }
        } else {
            match dependency.range() {
                Some(range) => Some((range.clone(), false)),
                None => {
                    diagnostics.push(
                        Diagnostic::new(
                            ErrorCode::InvalidSpec,
                            format!("'{}' does not declare a version range", id),
                        )
                        .with_library(id)
                        .with_framework(framework),
                    );
                    None
                }
            }
        };

        if let Some((range, centrally_managed)) = chosen {
            seeds.push(Seed {
                id: id.to_string(),
                range,
                path: vec![spec.name.clone(), id.to_string()],
                flags: dependency.effective_include(),
                private_assets: dependency.private_assets,
                direct: true,
                centrally_managed,
                explicit_compile: dependency.explicitly_includes_compile(),
            });
        }
    }

    seeds
}

/// Seeds for requests exported by referenced projects
fn flowing_seeds(spec: &PackageSpec, referenced: &[Referenced<'_>]) -> Vec<Seed> {
    let mut seeds = Vec::new();
    for project in referenced {
        let edge = project.reference.effective_include();
        for export in &project.resolution.exports {
            let mut path = Vec::with_capacity(export.path.len() + 1);
            path.push(spec.name.clone());
            path.extend(export.path.iter().cloned());
            seeds.push(Seed {
                id: export.id.clone(),
                range: export.range.clone(),
                path,
                flags: export.flags & edge,
                private_assets: project.reference.private_assets,
                direct: false,
                centrally_managed: false,
                explicit_compile: false,
            });
        }
    }
    seeds
}

/// Flags that reach each id: intersection along an edge, union across paths.
/// A development dependency does not pass compile assets on.
fn propagate_flags(
    framework: &FrameworkMoniker,
    seeds: &[Seed],
    locations: &BTreeMap<String, PackageLocation>,
    explicit_compile: &HashSet<&str>,
) -> BTreeMap<String, AssetFlags> {
    let mut flags: BTreeMap<String, AssetFlags> = BTreeMap::new();
    let mut queue = VecDeque::new();

    for seed in seeds {
        let entry = flags.entry(seed.id.clone()).or_insert(AssetFlags::NONE);
        *entry = *entry | seed.flags;
        if !queue.contains(&seed.id) {
            queue.push_back(seed.id.clone());
        }
    }

    while let Some(id) = queue.pop_front() {
        let Some(location) = locations.get(&id) else {
            continue;
        };
        let outgoing = effective_flags(&id, location, &flags, explicit_compile);
        for dependency in location.info.dependencies_for(framework) {
            let contributed = outgoing - dependency.exclude;
            let entry = flags
                .entry(dependency.id.clone())
                .or_insert(AssetFlags::NONE);
            let merged = *entry | contributed;
            if merged != *entry {
                *entry = merged;
                queue.push_back(dependency.id.clone());
            }
        }
    }

    flags
}

fn effective_flags(
    id: &str,
    location: &PackageLocation,
    flags: &BTreeMap<String, AssetFlags>,
    explicit_compile: &HashSet<&str>,
) -> AssetFlags {
    let incoming = flags.get(id).copied().unwrap_or(AssetFlags::NONE);
    if location.info.development_dependency && !explicit_compile.contains(id) {
        incoming - AssetFlags::COMPILE
    } else {
        incoming
    }
}

/// Packages consumed for compile or runtime that ship assemblies, none of
/// them usable by `framework`
fn incompatible_packages(
    framework: &FrameworkMoniker,
    locations: &BTreeMap<String, PackageLocation>,
    flags: &BTreeMap<String, AssetFlags>,
) -> Vec<Diagnostic> {
    locations
        .iter()
        .filter(|(id, _)| {
            let incoming = flags.get(*id).copied().unwrap_or(AssetFlags::NONE);
            !(incoming & (AssetFlags::COMPILE | AssetFlags::RUNTIME)).is_empty()
        })
        .filter(|(_, location)| !assets::is_compatible(&location.info.id, &location.info.files, framework))
        .map(|(id, location)| {
            let available: Vec<String> = assets::assembly_frameworks(&location.info.files)
                .iter()
                .map(ToString::to_string)
                .collect();
            Diagnostic::new(
                ErrorCode::IncompatibleFramework,
                format!(
                    "Package '{}' {} is not compatible with {}; it supports: {}",
                    id,
                    location.info.version,
                    framework,
                    available.join(", ")
                ),
            )
            .with_library(id)
            .with_framework(framework)
        })
        .collect()
}

fn package_library(
    framework: &FrameworkMoniker,
    location: &PackageLocation,
    direct: Option<&Seed>,
    pinned: bool,
    flags: AssetFlags,
) -> ResolvedLibrary {
    let info = &location.info;
    ResolvedLibrary {
        id: info.id.clone(),
        version: info.version.clone(),
        kind: LibraryKind::Package,
        dependency_type: if direct.is_some() {
            DependencyType::Direct
        } else {
            DependencyType::Transitive
        },
        centrally_managed: direct.map_or(pinned, |s| s.centrally_managed),
        requested: direct.map(|s| s.range.clone()),
        dependencies: info
            .dependencies_for(framework)
            .iter()
            .map(|d| (d.id.clone(), d.range.clone()))
            .collect(),
        development_dependency: info.development_dependency,
        framework: None,
        fallback_framework: false,
        path: None,
        flags,
        assets: assets::select_assets(&info.id, &info.files, framework).filtered(flags),
    }
}

/// Libraries for referenced projects, plus the subset passed on to consumers
fn collect_project_libraries(
    referenced: &[Referenced<'_>],
) -> (Vec<ResolvedLibrary>, Vec<ResolvedLibrary>) {
    let mut libraries: Vec<ResolvedLibrary> = Vec::new();
    let mut exported: Vec<ResolvedLibrary> = Vec::new();

    let push = |list: &mut Vec<ResolvedLibrary>, library: ResolvedLibrary| {
        if !list.iter().any(|l| l.id == library.id) {
            list.push(library);
        }
    };

    for project in referenced {
        let edge = project.reference.effective_include();
        let private = project.reference.private_assets;

        let mut chain = vec![project_library(project, edge)];
        chain.extend(project.resolution.project_libraries.iter().map(|l| {
            let flags = l.flags & edge;
            ResolvedLibrary {
                flags,
                assets: l.assets.clone().filtered(flags),
                ..l.clone()
            }
        }));

        for library in chain {
            if !private.is_all() {
                let flags = library.flags - private;
                push(
                    &mut exported,
                    ResolvedLibrary {
                        flags,
                        assets: library.assets.clone().filtered(flags),
                        ..library.clone()
                    },
                );
            }
            push(&mut libraries, library);
        }
    }

    (libraries, exported)
}

fn project_library(project: &Referenced<'_>, flags: AssetFlags) -> ResolvedLibrary {
    let spec = project.spec;
    let placeholder = format!("bin/placeholder/{}.dll", spec.name);
    let dependencies = project
        .resolution
        .exports
        .iter()
        .filter(|e| e.path.len() == 2)
        .map(|e| (e.id.clone(), e.range.clone()))
        .collect();

    ResolvedLibrary {
        id: spec.name.clone(),
        version: spec.version.clone(),
        kind: LibraryKind::Project,
        dependency_type: DependencyType::Project,
        centrally_managed: false,
        requested: None,
        dependencies,
        development_dependency: false,
        framework: Some(project.matched.framework.clone()),
        fallback_framework: project.matched.fallback,
        path: Some(spec.restore_metadata.project_path.display().to_string()),
        flags,
        assets: AssetGroups {
            compile: vec![placeholder.clone()],
            runtime: vec![placeholder],
            ..Default::default()
        }
        .filtered(flags),
    }
}

fn provider_diagnostic(err: &ProviderError, framework: &FrameworkMoniker) -> Diagnostic {
    let diagnostic = match err {
        ProviderError::PackageNotFound { id, .. } => {
            Diagnostic::new(ErrorCode::UnresolvedPackage, err.to_string()).with_library(id)
        }
        _ => Diagnostic::new(ErrorCode::SourceUnavailable, err.to_string()),
    };
    diagnostic.with_framework(framework)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        PackageInfo, PackageProvider, ProviderCache, StaticProvider, StaticProviderFactory,
    };
    use lockstep_config::{PackageSource, SourceSelection};
    use lockstep_model::{LibraryDependency, LockPolicy};
    use pretty_assertions::assert_eq;

    fn tfm(s: &str) -> FrameworkMoniker {
        FrameworkMoniker::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        s.parse().unwrap()
    }

    fn project(name: &str, deps: &[(&str, &str)], refs: &[&str]) -> PackageSpec {
        let mut spec = PackageSpec::new(name, format!("/src/{}", name));
        let mut tfi = TargetFrameworkInfo::new(tfm("net8.0"));
        for (id, r) in deps {
            tfi.dependencies
                .push(LibraryDependency::package(*id, Some(range(r))));
        }
        for r in refs {
            tfi.project_references.push(ProjectReference::new(*r));
        }
        spec.frameworks.push(tfi);
        spec.restore_metadata.lock_policy = LockPolicy::None;
        spec
    }

    fn resolver(graph: DependencyGraphSpec, provider: StaticProvider) -> Arc<GraphResolver> {
        let source = provider.source().clone();
        let factory = StaticProviderFactory::new().with_provider(provider);
        let cache = Arc::new(ProviderCache::new(Arc::new(factory), "test"));
        let repository = Arc::new(SourceRepository::new(
            cache,
            vec![source],
            SourceSelection::HighestVersion,
        ));
        Arc::new(GraphResolver::new(
            Arc::new(graph),
            repository,
            2,
            CancellationToken::new(),
        ))
    }

    fn feed() -> StaticProvider {
        let provider = StaticProvider::new(PackageSource::new("feed", "memory://feed"));
        for version in ["1.0.0", "1.0.1", "2.0.0"] {
            provider.add_package(
                PackageInfo::new("A", Version::parse(version).unwrap())
                    .with_files(["lib/net8.0/A.dll"]),
                Vec::new(),
            );
        }
        provider.add_package(
            PackageInfo::new("B", Version::new(1, 0, 0))
                .with_dependency(tfm("net8.0"), "A", range("[1.0.0, 2.0.0)")),
            Vec::new(),
        );
        provider
    }

    #[tokio::test]
    async fn test_transitive_range_caps_direct_request() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "1.0.0"), ("B", "1.0.0")], &[]));
        graph.add_restore("P");

        let resolutions = resolver(graph, feed()).resolve_project("P").await;
        let target = &resolutions[0].target;
        assert!(resolutions[0].success(), "{:?}", resolutions[0].diagnostics);
        let a = target.library("A").unwrap();
        assert_eq!(a.version, Version::new(1, 0, 1));
        assert_eq!(a.dependency_type, DependencyType::Direct);
        assert_eq!(a.assets.compile, vec!["lib/net8.0/A.dll"]);
    }

    #[tokio::test]
    async fn test_project_reference_flows_requests() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "1.*")], &["Q"]));
        graph.add_project(project("Q", &[("A", "[1.0.1]")], &[]));
        graph.add_restore("P");

        let resolver = resolver(graph, feed());
        let resolutions = resolver.resolve_project("P").await;
        let target = &resolutions[0].target;

        let ids: Vec<_> = target.libraries.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "Q"]);
        assert_eq!(target.library("A").unwrap().version, Version::new(1, 0, 1));
        let q = target.library("Q").unwrap();
        assert_eq!(q.kind, LibraryKind::Project);
        assert_eq!(q.framework, Some(tfm("net8.0")));
    }

    #[tokio::test]
    async fn test_self_reference_reported_instead_of_awaited() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "1.0.0")], &["Q"]));
        graph.add_project(project("Q", &[], &["Q"]));
        graph.add_restore("P");

        let resolver = resolver(graph, feed());
        let resolutions = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            resolver.resolve_project("P"),
        )
        .await
        .expect("resolution finished");
        let q = resolutions[0].target.project("Q").unwrap();
        assert_eq!(q.dependency_type, DependencyType::Project);

        let own = resolver.resolve_framework("Q", &tfm("net8.0")).await;
        assert!(!own.success());
        assert!(own
            .diagnostics
            .iter()
            .any(|d| d.code == ErrorCode::InvalidSpec && d.message.contains("'Q' references itself")));
    }

    #[tokio::test]
    async fn test_package_without_usable_assemblies_is_incompatible() {
        let provider = feed();
        provider.add_package(
            PackageInfo::new("Next", Version::new(1, 0, 0)).with_files(["lib/net9.0/Next.dll"]),
            Vec::new(),
        );
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("Next", "1.0.0"), ("B", "1.0.0")], &[]));
        graph.add_restore("P");

        let resolutions = resolver(graph, provider).resolve_project("P").await;
        let incompatible: Vec<_> = resolutions[0]
            .diagnostics
            .iter()
            .filter(|d| d.code == ErrorCode::IncompatibleFramework)
            .collect();
        assert_eq!(incompatible.len(), 1, "{:?}", resolutions[0].diagnostics);
        assert_eq!(incompatible[0].library_id.as_deref(), Some("Next"));
        assert!(incompatible[0].message.contains("supports: net9.0"), "{}", incompatible[0].message);
        assert!(!resolutions[0].success());
    }

    #[tokio::test]
    async fn test_conflict_names_every_path() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "[2.0.0]")], &["Q"]));
        graph.add_project(project("Q", &[("A", "[1.0.0]")], &[]));
        graph.add_restore("P");

        let resolutions = resolver(graph, feed()).resolve_project("P").await;
        let conflict = resolutions[0]
            .diagnostics
            .iter()
            .find(|d| d.code == ErrorCode::VersionConflict)
            .unwrap();
        assert!(conflict.message.contains("P -> A [2.0.0]"));
        assert!(conflict.message.contains("P -> Q -> A [1.0.0]"));
        assert!(!resolutions[0].success());
    }

    #[tokio::test]
    async fn test_missing_reference_is_reported() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "1.0.0")], &["Ghost"]));
        graph.add_restore("P");

        let resolutions = resolver(graph, feed()).resolve_project("P").await;
        assert!(resolutions[0]
            .diagnostics
            .iter()
            .any(|d| d.code == ErrorCode::MissingProjectReference));
        assert!(resolutions[0].target.library("A").is_some());
    }

    #[tokio::test]
    async fn test_enforced_lock_rejects_drift() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "[2.0.0]")], &[]));
        graph.add_restore("P");

        let mut locked = LockedVersions {
            enforce: true,
            ..Default::default()
        };
        locked
            .frameworks
            .entry(tfm("net8.0"))
            .or_default()
            .insert("A".to_string(), Version::new(1, 0, 0));

        let provider = feed();
        let source = provider.source().clone();
        let factory = StaticProviderFactory::new().with_provider(provider);
        let cache = Arc::new(ProviderCache::new(Arc::new(factory), "test"));
        let repository = Arc::new(SourceRepository::new(
            cache,
            vec![source],
            SourceSelection::HighestVersion,
        ));
        let resolver = Arc::new(
            GraphResolver::new(Arc::new(graph), repository, 1, CancellationToken::new())
                .with_locked_versions("P", locked),
        );

        let resolutions = resolver.resolve_project("P").await;
        assert!(resolutions[0]
            .diagnostics
            .iter()
            .any(|d| d.code == ErrorCode::LockedModeViolation));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(project("P", &[("A", "1.0.0")], &[]));
        graph.add_restore("P");

        let provider = feed();
        let source = provider.source().clone();
        let factory = StaticProviderFactory::new().with_provider(provider);
        let cache = Arc::new(ProviderCache::new(Arc::new(factory), "test"));
        let repository = Arc::new(SourceRepository::new(
            cache,
            vec![source],
            SourceSelection::HighestVersion,
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let resolver = Arc::new(GraphResolver::new(Arc::new(graph), repository, 1, cancel));

        let resolutions = resolver.resolve_project("P").await;
        assert!(resolutions[0].cancelled);
        assert_eq!(resolutions[0].diagnostics[0].code, ErrorCode::Cancelled);
    }
}
