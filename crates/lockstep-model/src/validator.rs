//! PackageSpec validation

use crate::spec::PackageSpec;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Project name cannot be empty")]
    EmptyName,

    #[error("Project '{0}' has no unique name")]
    EmptyUniqueName(String),

    #[error("Project '{0}' declares no target frameworks")]
    NoFrameworks(String),

    #[error("Target framework '{0}' is declared more than once")]
    DuplicateFramework(String),

    #[error("Dependency '{name}' is declared more than once for '{framework}'")]
    DuplicateDependency { name: String, framework: String },

    #[error("Dependency '{name}' for '{framework}': {reason}")]
    InvalidDependency {
        name: String,
        framework: String,
        reason: String,
    },

    #[error("Project '{0}' references itself")]
    SelfReference(String),
}

/// PackageSpec validator
pub struct Validator;

impl Validator {
    /// Validate a spec, collecting every problem
    pub fn validate(spec: &PackageSpec) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if spec.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
        }
        if spec.unique_name().trim().is_empty() {
            errors.push(ValidationError::EmptyUniqueName(spec.name.clone()));
        }
        if spec.frameworks.is_empty() {
            errors.push(ValidationError::NoFrameworks(spec.name.clone()));
        }

        let mut frameworks = HashSet::new();
        for framework in &spec.frameworks {
            if !frameworks.insert(&framework.framework) {
                errors.push(ValidationError::DuplicateFramework(
                    framework.framework.to_string(),
                ));
            }
        }

        errors.extend(Self::validate_dependencies(spec));
        errors.extend(Self::validate_references(spec));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_dependencies(spec: &PackageSpec) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for framework in &spec.frameworks {
            let tfm = framework.framework.to_string();
            let central = spec.uses_central_versions(framework);
            let mut seen = HashSet::new();

            for dep in &framework.dependencies {
                if dep.name().trim().is_empty() {
                    errors.push(ValidationError::InvalidDependency {
                        name: dep.name().to_string(),
                        framework: tfm.clone(),
                        reason: "name cannot be empty".to_string(),
                    });
                    continue;
                }

                // Package and project ids live in separate namespaces
                if !seen.insert((dep.is_project(), dep.name())) {
                    errors.push(ValidationError::DuplicateDependency {
                        name: dep.name().to_string(),
                        framework: tfm.clone(),
                    });
                }

                if dep.is_project() {
                    if dep.range().is_some() {
                        errors.push(ValidationError::InvalidDependency {
                            name: dep.name().to_string(),
                            framework: tfm.clone(),
                            reason: "project dependencies cannot carry a version range"
                                .to_string(),
                        });
                    }
                    continue;
                }

                if !central && dep.range().is_none() && dep.version_override.is_none() {
                    errors.push(ValidationError::InvalidDependency {
                        name: dep.name().to_string(),
                        framework: tfm.clone(),
                        reason: "a version range is required".to_string(),
                    });
                }
            }
        }

        errors
    }

    fn validate_references(spec: &PackageSpec) -> Vec<ValidationError> {
        let own = spec.unique_name();
        let refers_to_self = spec
            .referenced_projects()
            .iter()
            .any(|r| r == own || r.eq_ignore_ascii_case(&spec.name));

        if refers_to_self {
            vec![ValidationError::SelfReference(spec.name.clone())]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::FrameworkMoniker;
    use crate::spec::{LibraryDependency, LibraryRange, ProjectReference, TargetFrameworkInfo};

    fn spec_with(deps: Vec<LibraryDependency>) -> PackageSpec {
        let mut spec = PackageSpec::new("App", "/src/App");
        let mut framework = TargetFrameworkInfo::new(FrameworkMoniker::parse("net8.0").unwrap());
        framework.dependencies = deps;
        spec.frameworks.push(framework);
        spec
    }

    #[test]
    fn test_valid_spec() {
        let spec = spec_with(vec![LibraryDependency::package(
            "A",
            Some("1.0".parse().unwrap()),
        )]);
        assert!(Validator::validate(&spec).is_ok());
    }

    #[test]
    fn test_no_frameworks() {
        let spec = PackageSpec::new("App", "/src/App");
        let errors = Validator::validate(&spec).unwrap_err();
        assert!(errors.contains(&ValidationError::NoFrameworks("App".to_string())));
    }

    #[test]
    fn test_missing_range_without_central_versions() {
        let spec = spec_with(vec![LibraryDependency::package("A", None)]);
        let errors = Validator::validate(&spec).unwrap_err();
        assert!(matches!(
            &errors[0],
            ValidationError::InvalidDependency { name, .. } if name == "A"
        ));
    }

    #[test]
    fn test_missing_range_allowed_with_central_versions() {
        let mut spec = spec_with(vec![LibraryDependency::package("A", None)]);
        spec.restore_metadata.central_package_versions = true;
        assert!(Validator::validate(&spec).is_ok());
    }

    #[test]
    fn test_duplicate_dependency() {
        let range = Some("1.0".parse().unwrap());
        let spec = spec_with(vec![
            LibraryDependency::package("A", range.clone()),
            LibraryDependency::package("A", range),
        ]);
        let errors = Validator::validate(&spec).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_package_and_project_with_same_id_allowed() {
        let mut project_dep = LibraryDependency::package("Shared", None);
        project_dep.library_range = LibraryRange::project("Shared");
        let spec = spec_with(vec![
            LibraryDependency::package("Shared", Some("1.0".parse().unwrap())),
            project_dep,
        ]);
        assert!(Validator::validate(&spec).is_ok());
    }

    #[test]
    fn test_self_reference() {
        let mut spec = spec_with(Vec::new());
        spec.frameworks[0]
            .project_references
            .push(ProjectReference::new("App"));
        let errors = Validator::validate(&spec).unwrap_err();
        assert_eq!(errors, vec![ValidationError::SelfReference("App".to_string())]);
    }
}
