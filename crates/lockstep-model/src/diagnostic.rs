//! Restore diagnostics
//!
//! Every problem a restore reports carries a stable [`ErrorCode`]. The set of
//! codes is closed; callers can match on it exhaustively.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable diagnostic code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    VersionConflict,
    LockedModeViolation,
    ContentHashMismatch,
    MissingProjectReference,
    UnresolvedPackage,
    UnsatisfiableRange,
    CentralVersionConflict,
    MissingCentralVersion,
    InvalidSpec,
    IncompatibleFramework,
    FallbackFramework,
    SourceUnavailable,
    IoFailure,
    Cancelled,
}

/// Broad category, so callers can tell user errors from infrastructure errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    Input,
    Conflict,
    Integrity,
    Infrastructure,
    Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::VersionConflict => "version-conflict",
            ErrorCode::LockedModeViolation => "locked-mode-violation",
            ErrorCode::ContentHashMismatch => "content-hash-mismatch",
            ErrorCode::MissingProjectReference => "missing-project-reference",
            ErrorCode::UnresolvedPackage => "unresolved-package",
            ErrorCode::UnsatisfiableRange => "unsatisfiable-range",
            ErrorCode::CentralVersionConflict => "central-version-conflict",
            ErrorCode::MissingCentralVersion => "missing-central-version",
            ErrorCode::InvalidSpec => "invalid-spec",
            ErrorCode::IncompatibleFramework => "incompatible-framework",
            ErrorCode::FallbackFramework => "fallback-framework",
            ErrorCode::SourceUnavailable => "source-unavailable",
            ErrorCode::IoFailure => "io-failure",
            ErrorCode::Cancelled => "cancelled",
        }
    }

    pub fn kind(self) -> DiagnosticKind {
        match self {
            ErrorCode::VersionConflict => DiagnosticKind::Conflict,
            ErrorCode::LockedModeViolation | ErrorCode::ContentHashMismatch => {
                DiagnosticKind::Integrity
            }
            ErrorCode::SourceUnavailable | ErrorCode::IoFailure => DiagnosticKind::Infrastructure,
            ErrorCode::Cancelled => DiagnosticKind::Cancellation,
            ErrorCode::MissingProjectReference
            | ErrorCode::UnresolvedPackage
            | ErrorCode::UnsatisfiableRange
            | ErrorCode::CentralVersionConflict
            | ErrorCode::MissingCentralVersion
            | ErrorCode::InvalidSpec
            | ErrorCode::IncompatibleFramework
            | ErrorCode::FallbackFramework => DiagnosticKind::Input,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorCode::FallbackFramework => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported problem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_frameworks: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            message: message.into(),
            library_id: None,
            target_frameworks: Vec::new(),
        }
    }

    pub fn with_library(mut self, library_id: impl Into<String>) -> Self {
        self.library_id = Some(library_id.into());
        self
    }

    pub fn with_framework(mut self, framework: impl fmt::Display) -> Self {
        let framework = framework.to_string();
        if !self.target_frameworks.contains(&framework) {
            self.target_frameworks.push(framework);
            self.target_frameworks.sort();
        }
        self
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.code.kind()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn sort_key(&self) -> (Severity, ErrorCode, &str, Option<&str>, &[String]) {
        (
            self.severity,
            self.code,
            self.message.as_str(),
            self.library_id.as_deref(),
            self.target_frameworks.as_slice(),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Deduplicate and order diagnostics: errors before warnings, then by code and message
pub fn normalize(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    diagnostics.dedup();
    diagnostics
}
