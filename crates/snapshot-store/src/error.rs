//! Error types for snapshot-store

use thiserror::Error;

/// Errors that can occur while probing, reading or writing snapshots.
///
/// "No snapshot for this commit" during a lookup is not an error: probes
/// return `false` and [`crate::SnapshotStore::find_nearest`] returns `None`.
/// `NotFound` is only produced by an explicit fetch.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Snapshot not found for an explicit fetch
    #[error("snapshot not found for commit {commit}")]
    NotFound { commit: String },

    /// Commit id cannot be used as a storage key
    #[error("invalid commit id for storage key: {commit:?}")]
    InvalidId { commit: String },

    /// Stored blob does not match its recorded checksum
    #[error("snapshot for commit {commit} is corrupt: expected sha256 {expected}, got {actual}")]
    Corrupt {
        commit: String,
        expected: String,
        actual: String,
    },

    /// Remote object storage failure (network or unexpected status)
    #[error("remote storage {operation} failed for commit {commit}: {detail}")]
    Remote {
        operation: &'static str,
        commit: String,
        detail: String,
    },

    /// Backend could not be constructed from its configuration
    #[error("storage backend misconfigured: {0}")]
    Config(String),

    /// Local I/O failure
    #[error("storage {operation} failed for commit {commit}: {source}")]
    Io {
        operation: &'static str,
        commit: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(operation: &'static str, commit: &str, source: std::io::Error) -> Self {
        StorageError::Io {
            operation,
            commit: commit.to_string(),
            source,
        }
    }

    pub(crate) fn remote(
        operation: &'static str,
        commit: &str,
        detail: impl std::fmt::Display,
    ) -> Self {
        StorageError::Remote {
            operation,
            commit: commit.to_string(),
            detail: detail.to_string(),
        }
    }
}
