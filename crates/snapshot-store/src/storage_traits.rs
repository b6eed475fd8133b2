//! Storage trait definitions for deltabuild
//!
//! A snapshot is one opaque blob (an archive of build outputs) keyed by the
//! commit it was built at. Backends differ only in where the blob lives:
//! - `FsSnapshotStore`: one file per commit under a root directory
//! - `RemoteSnapshotStore`: one object per commit under `<bucket>/<commit>`
//! - `MemorySnapshotStore`: in-memory fake for tests
//!
//! All backends expose identical semantics through [`SnapshotStore`].

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// CommitId
// ---------------------------------------------------------------------------

/// Opaque version-control commit identifier.
///
/// No ordering or numeric semantics are assumed; recency comes from the
/// position in the history list the VCS returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        CommitId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars), for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Return the id as a single path segment / object key.
    ///
    /// Rejects ids that are empty or could escape the store root.
    pub fn storage_key(&self) -> StorageResult<&str> {
        let id = self.0.as_str();
        let bad = id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0'])
            || id.trim() != id;
        if bad {
            return Err(StorageError::InvalidId {
                commit: id.to_string(),
            });
        }
        Ok(id)
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId(s.to_string())
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        CommitId(s)
    }
}

/// Hex-encoded SHA-256 of `data`, used for blob checksums.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of the file at `path`, read in chunks.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Commit-keyed snapshot store.
///
/// Guarantees:
/// - `store(id, blob)` overwrites any existing snapshot for `id`.
/// - `fetch(id, dest)` writes the exact bytes last stored for `id`, or fails
///   with `StorageError::NotFound`.
/// - `find_nearest(candidates)` returns the first candidate, in the order
///   given, that has a snapshot.
///
/// Nothing is retried here; callers own retry policy.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Human-readable backend description for log lines.
    fn describe(&self) -> String;

    /// Check whether a snapshot exists for `id`.
    async fn contains(&self, id: &CommitId) -> StorageResult<bool>;

    /// Copy the snapshot for `id` to the file at `dest`.
    async fn fetch(&self, id: &CommitId, dest: &Path) -> StorageResult<()>;

    /// Persist the blob at `blob` as the snapshot for `id`.
    async fn store(&self, id: &CommitId, blob: &Path) -> StorageResult<()>;

    /// Find the most recent candidate with a stored snapshot.
    ///
    /// `candidates` must be ordered most-recent first. Existence probes run
    /// concurrently, but results are read back in list order: the answer is
    /// the earliest hit, and a failed probe only matters when it comes
    /// before that hit.
    async fn find_nearest(&self, candidates: &[CommitId]) -> StorageResult<Option<CommitId>> {
        let probes = candidates.iter().map(|id| self.contains(id));
        let results = futures::future::join_all(probes).await;

        for (id, present) in candidates.iter().zip(results) {
            if present? {
                return Ok(Some(id.clone()));
            }
        }
        Ok(None)
    }
}
