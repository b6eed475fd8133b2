//! Error taxonomy for deltabuild.

use std::path::PathBuf;

use snapshot_store::StorageError;

use crate::archive::ArchiveError;

/// deltabuild errors.
///
/// "No snapshot found" and "no changed files" are normal outcomes and never
/// show up here.
#[derive(Debug, thiserror::Error)]
pub enum DeltaBuildError {
    #[error("failed to parse project structure at {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("project {project} depends on unknown project {dependency}")]
    MalformedGraph { project: String, dependency: String },

    #[error("project not found in structure: {project}")]
    ProjectNotFound { project: String },

    #[error("dependency cycle detected involving projects: {projects:?}")]
    DependencyCycle { projects: Vec<String> },

    #[error("vcs {operation} failed: {detail}")]
    Vcs {
        operation: &'static str,
        detail: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeltaBuildError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DeltaBuildError::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn vcs(operation: &'static str, detail: impl Into<String>) -> Self {
        DeltaBuildError::Vcs {
            operation,
            detail: detail.into(),
        }
    }
}

/// Result type for deltabuild operations.
pub type Result<T> = std::result::Result<T, DeltaBuildError>;
