//! Conflict reporting for version resolution

use super::version_solver::VersionConstraint;
use lockstep_model::{Diagnostic, ErrorCode, FrameworkMoniker, VersionRange};

/// Conflict information for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub package: String,
    pub constraints: Vec<ConflictingConstraint>,
}

/// A single conflicting constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingConstraint {
    pub requirement: VersionRange,
    /// Requesting path, `P -> Q -> A`
    pub source: String,
}

impl Conflict {
    pub fn new(package: String, mut constraints: Vec<ConflictingConstraint>) -> Self {
        constraints.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.requirement.to_string().cmp(&b.requirement.to_string()))
        });
        constraints.dedup();
        Self {
            package,
            constraints,
        }
    }

    /// Single-line report naming every requesting path
    pub fn report(&self) -> String {
        let paths: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{} {}", c.source, c.requirement))
            .collect();
        format!(
            "No version of '{}' satisfies every request: {}",
            self.package,
            paths.join("; ")
        )
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn to_diagnostic(&self, framework: &FrameworkMoniker) -> Diagnostic {
        Diagnostic::new(ErrorCode::VersionConflict, self.report())
            .with_library(&self.package)
            .with_framework(framework)
    }
}

impl ConflictingConstraint {
    pub fn new(requirement: VersionRange, source: String) -> Self {
        Self {
            requirement,
            source,
        }
    }

    pub fn from_version_constraint(vc: &VersionConstraint) -> Self {
        Self {
            requirement: vc.range.clone(),
            source: vc.path_display(),
        }
    }

    /// Diagnostic for a range that no available version satisfies
    pub fn unsatisfiable(&self, package: &str, framework: &FrameworkMoniker) -> Diagnostic {
        Diagnostic::new(
            ErrorCode::UnsatisfiableRange,
            format!(
                "No available version of '{}' satisfies {} (requested by {})",
                package, self.requirement, self.source
            ),
        )
        .with_library(package)
        .with_framework(framework)
    }
}
