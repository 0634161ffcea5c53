use super::conflict::{Conflict, ConflictingConstraint};
use lockstep_model::VersionRange;
use semver::Version;

/// A range requested for a package id, with the path that requested it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub range: VersionRange,
    /// Requesting chain, project first, package id last
    pub path: Vec<String>,
}

impl VersionConstraint {
    pub fn new(range: VersionRange, path: Vec<String>) -> Self {
        Self { range, path }
    }

    pub fn path_display(&self) -> String {
        self.path.join(" -> ")
    }
}

/// Outcome of selecting one version for one id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(Version),
    /// No source lists any version of the id
    NoVersions,
    /// One constraint alone matches nothing
    Unsatisfiable(ConflictingConstraint),
    /// Each constraint matches something but no version matches all
    Conflict(Conflict),
}

/// Picks one version per id from the candidate list
#[derive(Debug, Clone, Default)]
pub struct VersionSolver;

impl VersionSolver {
    pub fn new() -> Self {
        Self
    }

    /// Highest version satisfying every constraint. Stable versions outrank
    /// prereleases unless some constraint asks for a prerelease. A preferred
    /// version wins whenever it satisfies every constraint.
    pub fn select(
        &self,
        id: &str,
        available: &[Version],
        constraints: &[VersionConstraint],
        preferred: Option<&Version>,
    ) -> Selection {
        if available.is_empty() {
            return Selection::NoVersions;
        }

        if let Some(preferred) = preferred {
            if available.contains(preferred) && Self::satisfies_all(preferred, constraints) {
                return Selection::Selected(preferred.clone());
            }
        }

        if let Some(best) = self.max_satisfying_version(available, constraints) {
            return Selection::Selected(best);
        }

        if let Some(alone) = constraints
            .iter()
            .find(|c| c.range.find_best_match(available).is_none())
        {
            return Selection::Unsatisfiable(ConflictingConstraint::from_version_constraint(alone));
        }

        Selection::Conflict(Conflict::new(
            id.to_string(),
            constraints
                .iter()
                .map(ConflictingConstraint::from_version_constraint)
                .collect(),
        ))
    }

    /// Find maximum version satisfying all constraints
    pub fn max_satisfying_version(
        &self,
        available: &[Version],
        constraints: &[VersionConstraint],
    ) -> Option<Version> {
        let allow_prerelease = constraints.iter().any(|c| c.range.requests_prerelease());
        available
            .iter()
            .filter(|v| Self::satisfies_all(v, constraints))
            .max_by(|a, b| {
                let rank_a = allow_prerelease || a.pre.is_empty();
                let rank_b = allow_prerelease || b.pre.is_empty();
                rank_a.cmp(&rank_b).then_with(|| a.cmp(b))
            })
            .cloned()
    }

    pub fn satisfies_all(version: &Version, constraints: &[VersionConstraint]) -> bool {
        constraints.iter().all(|c| c.range.satisfies(version))
    }
}
