//! Lock file reconciliation
//!
//! `none` never touches the file. `write-on-change` reuses locked versions as
//! hints while the file still matches the project, and rewrites it whenever
//! resolution changes. `enforce-locked` treats the file as authoritative: any
//! drift is a `locked-mode-violation` and the file is left untouched. An
//! enforce-locked project without a lock file writes one on first restore.

use super::{LockFile, LockTarget};
use crate::error::{RestoreError, RestoreResult};
use crate::graph::DependencyType;
use crate::resolver::LockedVersions;
use lockstep_model::{
    DependencyGraphSpec, Diagnostic, ErrorCode, FrameworkMoniker, LockPolicy, PackageSpec,
    VersionRange,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

/// What was found on disk before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Absent,
    Valid(LockFile),
    /// The file exists but no longer matches the project
    Invalid {
        lock: Option<LockFile>,
        reasons: Vec<String>,
    },
}

/// Result of comparing a resolution with the persisted lock file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockOutcome {
    pub diagnostics: Vec<Diagnostic>,
    /// The resolved lock file should be saved
    pub write: bool,
}

/// Per-project lock file state for one restore
#[derive(Debug, Clone)]
pub struct LockReconciler {
    path: PathBuf,
    policy: LockPolicy,
    state: LockState,
}

impl LockReconciler {
    /// Read and validate the lock file of `spec`. `force_locked` upgrades
    /// every policy to enforce-locked.
    pub fn load(
        spec: &PackageSpec,
        graph: &DependencyGraphSpec,
        force_locked: bool,
    ) -> RestoreResult<Self> {
        let policy = if force_locked {
            LockPolicy::EnforceLocked
        } else {
            spec.restore_metadata.lock_policy
        };
        let path = super::lock_file_path(spec);

        let state = if policy == LockPolicy::None {
            LockState::Absent
        } else {
            match LockFile::load(&path) {
                Ok(None) => LockState::Absent,
                Ok(Some(lock)) => {
                    let reasons = validate(&lock, spec, graph);
                    if reasons.is_empty() {
                        LockState::Valid(lock)
                    } else {
                        debug!(project = %spec.name, ?reasons, "lock file is out of date");
                        LockState::Invalid {
                            lock: Some(lock),
                            reasons,
                        }
                    }
                }
                Err(RestoreError::Json { source, .. }) => LockState::Invalid {
                    lock: None,
                    reasons: vec![format!("the lock file could not be parsed: {}", source)],
                },
                Err(err) => return Err(err),
            }
        };

        Ok(Self {
            path,
            policy,
            state,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    pub fn state(&self) -> &LockState {
        &self.state
    }

    /// The file as read, valid or not
    pub fn persisted(&self) -> Option<&LockFile> {
        match &self.state {
            LockState::Valid(lock) => Some(lock),
            LockState::Invalid { lock, .. } => lock.as_ref(),
            LockState::Absent => None,
        }
    }

    /// Resolution hints; only a lock file that still matches the project
    /// contributes
    pub fn hints(&self) -> Option<LockedVersions> {
        match &self.state {
            LockState::Valid(lock) => Some(LockedVersions {
                enforce: self.policy == LockPolicy::EnforceLocked,
                frameworks: lock.locked_versions(),
            }),
            _ => None,
        }
    }

    /// Decide whether `resolved` may be written and what drift to report
    pub fn reconcile(&self, resolved: &LockFile) -> LockOutcome {
        match (self.policy, &self.state) {
            (LockPolicy::None, _) => LockOutcome::default(),
            (LockPolicy::WriteOnChange, _) => LockOutcome {
                diagnostics: Vec::new(),
                write: true,
            },
            (LockPolicy::EnforceLocked, LockState::Absent) => LockOutcome {
                diagnostics: Vec::new(),
                write: true,
            },
            (LockPolicy::EnforceLocked, LockState::Invalid { reasons, .. }) => LockOutcome {
                diagnostics: vec![violation(&self.path, reasons)],
                write: false,
            },
            (LockPolicy::EnforceLocked, LockState::Valid(lock)) => {
                let drift = differences(lock, resolved);
                LockOutcome {
                    diagnostics: if drift.is_empty() {
                        Vec::new()
                    } else {
                        vec![violation(&self.path, &drift)]
                    },
                    write: false,
                }
            }
        }
    }
}

fn violation(path: &std::path::Path, reasons: &[String]) -> Diagnostic {
    Diagnostic::new(
        ErrorCode::LockedModeViolation,
        format!(
            "The lock file {} does not match the project: {}",
            path.display(),
            reasons.join("; ")
        ),
    )
}

fn display_range(range: &Option<VersionRange>) -> String {
    range
        .as_ref()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Reasons the lock file no longer describes `spec`; empty when it does
pub fn validate(lock: &LockFile, spec: &PackageSpec, graph: &DependencyGraphSpec) -> Vec<String> {
    if lock.version > LockFile::VERSION {
        return vec![format!(
            "lock file version {} is newer than the supported version {}",
            lock.version,
            LockFile::VERSION
        )];
    }

    let mut reasons = Vec::new();
    let declared: BTreeSet<&FrameworkMoniker> = spec.frameworks.iter().map(|f| &f.framework).collect();
    let locked: BTreeSet<&FrameworkMoniker> = lock.targets.iter().map(|t| &t.framework).collect();
    for missing in declared.difference(&locked) {
        reasons.push(format!("framework {} is missing from the lock file", missing));
    }
    for dropped in locked.difference(&declared) {
        reasons.push(format!("framework {} is no longer targeted", dropped));
    }

    let closure: BTreeSet<String> = graph
        .closure(spec.unique_name())
        .map(|c| {
            c.projects
                .iter()
                .skip(1)
                .map(|p| p.name.to_lowercase())
                .collect()
        })
        .unwrap_or_default();

    for tfi in &spec.frameworks {
        let Some(target) = lock.target(&tfi.framework) else {
            continue;
        };
        let framework = &tfi.framework;
        let central = spec.uses_central_versions(tfi);

        let direct: BTreeMap<&str, Option<VersionRange>> = tfi
            .package_dependencies()
            .map(|dep| {
                let central_range = central
                    .then(|| tfi.central_versions.get(dep.name()).map(|c| c.range.clone()))
                    .flatten();
                let requested = dep
                    .version_override
                    .clone()
                    .or(central_range)
                    .or_else(|| dep.range().cloned());
                (dep.name(), requested)
            })
            .collect();

        for (id, requested) in &direct {
            match target.entry(id) {
                Some(entry) if entry.dependency_type == DependencyType::Direct => {
                    if &entry.requested != requested {
                        reasons.push(format!(
                            "requested range of '{}' for {} changed from {} to {}",
                            id,
                            framework,
                            display_range(&entry.requested),
                            display_range(requested)
                        ));
                    }
                }
                _ => reasons.push(format!("'{}' is a new direct dependency for {}", id, framework)),
            }
        }
        for (id, entry) in &target.entries {
            if entry.dependency_type == DependencyType::Direct && !direct.contains_key(id.as_str()) {
                reasons.push(format!("'{}' is no longer a direct dependency for {}", id, framework));
            }
        }

        for reference in tfi.all_project_references() {
            let name = graph
                .resolve_reference(&reference.unique_name)
                .map_or_else(|| reference.unique_name.to_lowercase(), |p| p.name.to_lowercase());
            if target.project(&name).is_none() {
                reasons.push(format!("project reference '{}' was added for {}", name, framework));
            }
        }
        for (id, entry) in &target.entries {
            if entry.dependency_type == DependencyType::Project && !closure.contains(id) {
                reasons.push(format!("project reference '{}' was removed for {}", id, framework));
            }
        }
    }

    reasons
}

/// Differences between two lock files, ignoring content hashes
pub fn differences(persisted: &LockFile, resolved: &LockFile) -> Vec<String> {
    let mut drift = Vec::new();
    let frameworks: BTreeSet<&FrameworkMoniker> = persisted
        .targets
        .iter()
        .chain(resolved.targets.iter())
        .map(|t| &t.framework)
        .collect();

    for framework in frameworks {
        match (persisted.target(framework), resolved.target(framework)) {
            (Some(old), Some(new)) => target_differences(old, new, &mut drift),
            (Some(_), None) => drift.push(format!("framework {} is no longer resolved", framework)),
            (None, Some(_)) => drift.push(format!("framework {} is not in the lock file", framework)),
            (None, None) => {}
        }
    }
    drift
}

fn target_differences(old: &LockTarget, new: &LockTarget, drift: &mut Vec<String>) {
    let framework = &new.framework;
    for (id, entry) in &new.entries {
        match old.find(id, entry.is_package()) {
            None => drift.push(format!("'{}' ({}) is not in the lock file", id, framework)),
            Some(locked) if locked.resolved != entry.resolved => drift.push(format!(
                "'{}' ({}) is locked at {} but resolved to {}",
                id,
                framework,
                locked
                    .resolved
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |v| v.to_string()),
                entry
                    .resolved
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |v| v.to_string()),
            )),
            Some(locked)
                if locked.dependency_type != entry.dependency_type
                    || locked.requested != entry.requested
                    || locked.dependencies != entry.dependencies =>
            {
                drift.push(format!("'{}' ({}) changed", id, framework))
            }
            Some(_) => {}
        }
    }
    for (id, entry) in &old.entries {
        if new.find(id, entry.is_package()).is_none() {
            drift.push(format!("'{}' ({}) is locked but no longer resolved", id, framework));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockEntry;
    use lockstep_model::{LibraryDependency, ProjectReference, TargetFrameworkInfo};
    use pretty_assertions::assert_eq;
    use semver::Version;
    use tempfile::TempDir;

    fn tfm() -> FrameworkMoniker {
        FrameworkMoniker::parse("net8.0").unwrap()
    }

    fn entry(dependency_type: DependencyType, requested: Option<&str>, resolved: &str) -> LockEntry {
        LockEntry {
            dependency_type,
            requested: requested.map(|r| r.parse().unwrap()),
            resolved: Some(Version::parse(resolved).unwrap()),
            content_hash: Some("hash".to_string()),
            centrally_managed: false,
            dependencies: BTreeMap::new(),
        }
    }

    fn spec(dir: &std::path::Path, range: &str) -> PackageSpec {
        let mut spec = PackageSpec::new("App", dir);
        let mut tfi = TargetFrameworkInfo::new(tfm());
        tfi.dependencies
            .push(LibraryDependency::package("A", Some(range.parse().unwrap())));
        spec.frameworks.push(tfi);
        spec
    }

    fn lock(range: &str, resolved: &str) -> LockFile {
        LockFile::new(vec![LockTarget::new(
            tfm(),
            vec![("A".to_string(), entry(DependencyType::Direct, Some(range), resolved))],
        )])
    }

    fn graph_with(spec: &PackageSpec) -> DependencyGraphSpec {
        let mut graph = DependencyGraphSpec::new();
        graph.add_project(spec.clone());
        graph
    }

    #[test]
    fn test_matching_lock_is_valid() {
        let dir = TempDir::new().unwrap();
        let spec = spec(dir.path(), "1.0.0");
        assert!(validate(&lock("1.0.0", "1.0.0"), &spec, &graph_with(&spec)).is_empty());
    }

    #[test]
    fn test_changed_range_and_new_framework() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(dir.path(), "2.0.0");
        spec.frameworks
            .push(TargetFrameworkInfo::new(FrameworkMoniker::parse("net472").unwrap()));
        let reasons = validate(&lock("1.0.0", "1.0.0"), &spec, &graph_with(&spec));
        assert_eq!(
            reasons,
            vec![
                "framework net472 is missing from the lock file".to_string(),
                "requested range of 'A' for net8.0 changed from [1.0.0, ) to [2.0.0, )".to_string(),
            ]
        );
    }

    #[test]
    fn test_added_project_reference() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(dir.path(), "1.0.0");
        spec.frameworks[0]
            .project_references
            .push(ProjectReference::new("Lib"));
        let reasons = validate(&lock("1.0.0", "1.0.0"), &spec, &graph_with(&spec));
        assert_eq!(reasons, vec!["project reference 'lib' was added for net8.0".to_string()]);
    }

    #[test]
    fn test_project_sharing_a_package_id_is_recognized() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(dir.path(), "1.0.0");
        spec.frameworks[0]
            .dependencies
            .push(LibraryDependency::package("Lib", Some("1.0.0".parse().unwrap())));
        spec.frameworks[0]
            .project_references
            .push(ProjectReference::new("Lib"));
        let mut graph = graph_with(&spec);
        graph.add_project(PackageSpec::new("Lib", dir.path().join("Lib")));

        let lock = LockFile::new(vec![LockTarget::new(
            tfm(),
            vec![
                ("A".to_string(), entry(DependencyType::Direct, Some("1.0.0"), "1.0.0")),
                ("Lib".to_string(), entry(DependencyType::Direct, Some("1.0.0"), "1.0.0")),
                ("lib".to_string(), LockEntry {
                    dependency_type: DependencyType::Project,
                    requested: None,
                    resolved: None,
                    content_hash: None,
                    centrally_managed: false,
                    dependencies: BTreeMap::new(),
                }),
            ],
        )]);
        assert_eq!(validate(&lock, &spec, &graph), Vec::<String>::new());
        assert!(differences(&lock, &lock.clone()).is_empty());
    }

    #[test]
    fn test_newer_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let spec = spec(dir.path(), "1.0.0");
        let mut newer = lock("1.0.0", "1.0.0");
        newer.version = 2;
        assert_eq!(validate(&newer, &spec, &graph_with(&spec)).len(), 1);
    }

    #[test]
    fn test_differences_ignore_hashes() {
        let old = lock("1.0.0", "1.0.0");
        let mut same = lock("1.0.0", "1.0.0");
        same.targets[0].entries[0].1.content_hash = None;
        assert!(differences(&old, &same).is_empty());

        let bumped = lock("1.0.0", "1.1.0");
        assert_eq!(
            differences(&old, &bumped),
            vec!["'A' (net8.0) is locked at 1.0.0 but resolved to 1.1.0".to_string()]
        );
    }

    #[test]
    fn test_enforced_policy_reports_drift_without_writing() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(dir.path(), "1.0.0");
        spec.restore_metadata.lock_policy = LockPolicy::EnforceLocked;
        let graph = graph_with(&spec);
        lock("1.0.0", "1.0.0")
            .save(&super::super::lock_file_path(&spec))
            .unwrap();

        let reconciler = LockReconciler::load(&spec, &graph, false).unwrap();
        assert!(matches!(reconciler.state(), LockState::Valid(_)));
        let hints = reconciler.hints().unwrap();
        assert!(hints.enforce);
        assert_eq!(hints.version(&tfm(), "A"), Some(&Version::new(1, 0, 0)));

        let outcome = reconciler.reconcile(&lock("1.0.0", "1.1.0"));
        assert!(!outcome.write);
        assert_eq!(outcome.diagnostics[0].code, ErrorCode::LockedModeViolation);
    }

    #[test]
    fn test_policy_none_ignores_file() {
        let dir = TempDir::new().unwrap();
        let spec = spec(dir.path(), "1.0.0");
        let graph = graph_with(&spec);
        std::fs::write(super::super::lock_file_path(&spec), "not json").unwrap();

        let reconciler = LockReconciler::load(&spec, &graph, false).unwrap();
        assert_eq!(reconciler.state(), &LockState::Absent);
        assert_eq!(reconciler.reconcile(&lock("1.0.0", "1.0.0")), LockOutcome::default());
    }

    #[test]
    fn test_corrupt_lock_is_invalid_under_write_on_change() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(dir.path(), "1.0.0");
        spec.restore_metadata.lock_policy = LockPolicy::WriteOnChange;
        let graph = graph_with(&spec);
        std::fs::write(super::super::lock_file_path(&spec), "not json").unwrap();

        let reconciler = LockReconciler::load(&spec, &graph, false).unwrap();
        assert!(matches!(reconciler.state(), LockState::Invalid { lock: None, .. }));
        assert!(reconciler.hints().is_none());
        assert!(reconciler.reconcile(&lock("1.0.0", "1.0.0")).write);
    }
}
