//! Per-project restore outcome

use lockstep_model::{Diagnostic, ErrorCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// What a restore did for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub project: String,
    pub success: bool,
    pub no_op_restore: bool,
    pub install_count: usize,
    pub status: RestoreStatus,
    /// Errors and warnings, normalized
    pub errors: Vec<Diagnostic>,
}

impl RestoreSummary {
    /// Summary of a finished restore; success means no error diagnostics
    pub fn finished(
        project: impl Into<String>,
        no_op_restore: bool,
        install_count: usize,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let errors = lockstep_model::normalize(diagnostics);
        let cancelled = errors.iter().any(|d| d.code == ErrorCode::Cancelled);
        let success = !cancelled && !errors.iter().any(Diagnostic::is_error);
        Self {
            project: project.into(),
            success,
            no_op_restore: no_op_restore && success,
            install_count,
            status: if cancelled {
                RestoreStatus::Cancelled
            } else if success {
                RestoreStatus::Succeeded
            } else {
                RestoreStatus::Failed
            },
            errors,
        }
    }

    pub fn cancelled(project: impl Into<String>) -> Self {
        let project = project.into();
        let diagnostic = Diagnostic::new(
            ErrorCode::Cancelled,
            format!("Restore of '{}' was cancelled", project),
        );
        Self::finished(project, false, 0, vec![diagnostic])
    }

    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.errors
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.code)
            .collect()
    }

    pub fn has_error(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|d| d.code == code && d.is_error())
    }
}
