//! Hard failures of the restore API
//!
//! Problems with a project's dependencies are reported as
//! [`Diagnostic`](lockstep_model::Diagnostic)s inside a
//! [`RestoreSummary`](crate::RestoreSummary). `RestoreError` is reserved for
//! misuse of the API and for failures that leave no project to report on.

use lockstep_model::GraphSpecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Project '{0}' is listed for restore but has no spec in the graph")]
    UnknownProject(String),

    #[error(transparent)]
    GraphSpec(#[from] GraphSpecError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type RestoreResult<T> = Result<T, RestoreError>;

impl RestoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RestoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(what: &'static str, source: serde_json::Error) -> Self {
        RestoreError::Json { what, source }
    }
}
