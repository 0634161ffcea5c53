//! Lockstep data model
//!
//! Leaf types shared by every part of a restore:
//! - Package versions and interval version ranges
//! - Target framework monikers and their compatibility rules
//! - Per-project restore input ([`PackageSpec`]) and the solution-wide
//!   [`DependencyGraphSpec`]
//! - Spec validation
//! - The closed set of restore diagnostics

pub mod diagnostic;
pub mod framework;
pub mod graph_spec;
pub mod spec;
pub mod validator;
pub mod version;

pub use diagnostic::{normalize, Diagnostic, DiagnosticKind, ErrorCode, Severity};
pub use framework::{FrameworkError, FrameworkFamily, FrameworkMatch, FrameworkMoniker};
pub use graph_spec::{
    DependencyGraphSpec, GraphSpecError, GraphSpecResult, MissingReference, ProjectClosure,
};
pub use spec::{
    AssetFlags, CentralVersion, DependencyTarget, LibraryDependency, LibraryRange, LockPolicy,
    PackageSpec, ProjectReference, RestoreMetadata, TargetFrameworkInfo,
};
pub use validator::{ValidationError, Validator};
pub use version::{parse_version, FloatBehavior, VersionError, VersionRange, VersionResult};

// Re-exported so dependents agree on the version type
pub use semver::Version;
