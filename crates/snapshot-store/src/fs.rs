use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage_traits::{sha256_file, CommitId, SnapshotStore, StorageResult};

const BLOB_EXT: &str = "snapshot";
const CHECKSUM_EXT: &str = "sha256";

/// Filesystem-backed snapshot store.
///
/// Layout: `<root>/<commit>.snapshot` plus a `<root>/<commit>.sha256` sidecar
/// holding the hex checksum of the blob.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first `store`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &CommitId) -> StorageResult<PathBuf> {
        Ok(self.root.join(format!("{}.{BLOB_EXT}", id.storage_key()?)))
    }

    fn checksum_path(&self, id: &CommitId) -> StorageResult<PathBuf> {
        Ok(self.root.join(format!("{}.{CHECKSUM_EXT}", id.storage_key()?)))
    }
}

/// Copy `reader` to `path` through a temp file in the same directory plus a
/// rename, so readers never see a partial file. Returns the bytes written.
fn write_atomic(path: &Path, mut reader: impl Read) -> io::Result<u64> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("snapshot path has no parent"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    let written = io::copy(&mut reader, &mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(written)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Replace the blob and its checksum for one commit.
///
/// The old checksum goes first: an interruption at any point leaves either
/// a matching pair or a blob with no checksum, never a blob next to the
/// checksum of different contents.
fn replace_snapshot(source: &Path, blob_path: &Path, checksum_path: &Path) -> io::Result<u64> {
    let checksum = sha256_file(source)?;
    remove_if_exists(checksum_path)?;
    let bytes = write_atomic(blob_path, File::open(source)?)?;
    write_atomic(checksum_path, checksum.as_bytes())?;
    Ok(bytes)
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }

    async fn contains(&self, id: &CommitId) -> StorageResult<bool> {
        let path = self.blob_path(id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io("probe", id.as_str(), e))
    }

    async fn fetch(&self, id: &CommitId, dest: &Path) -> StorageResult<()> {
        let path = self.blob_path(id)?;
        let actual = run_blocking({
            let path = path.clone();
            move || sha256_file(&path)
        })
        .await
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound {
                    commit: id.to_string(),
                }
            } else {
                StorageError::io("fetch", id.as_str(), e)
            }
        })?;

        match tokio::fs::read_to_string(self.checksum_path(id)?).await {
            Ok(expected) => {
                let expected = expected.trim().to_string();
                if expected != actual {
                    return Err(StorageError::Corrupt {
                        commit: id.to_string(),
                        expected,
                        actual,
                    });
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(commit = %id, "snapshot has no checksum sidecar, skipping verification");
            }
            Err(e) => return Err(StorageError::io("fetch", id.as_str(), e)),
        }

        let bytes = tokio::fs::copy(&path, dest)
            .await
            .map_err(|e| StorageError::io("fetch", id.as_str(), e))?;
        debug!(commit = %id, bytes, "fetched snapshot from filesystem");
        Ok(())
    }

    async fn store(&self, id: &CommitId, blob: &Path) -> StorageResult<()> {
        let blob_path = self.blob_path(id)?;
        let checksum_path = self.checksum_path(id)?;
        let source = blob.to_path_buf();

        let bytes = run_blocking(move || replace_snapshot(&source, &blob_path, &checksum_path))
            .await
            .map_err(|e| StorageError::io("store", id.as_str(), e))?;

        debug!(commit = %id, bytes, "stored snapshot on filesystem");
        Ok(())
    }
}
