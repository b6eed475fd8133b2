//! In-memory fake for the snapshot store trait (testing only)
//!
//! `MemorySnapshotStore` satisfies the [`SnapshotStore`] contract without any
//! disk or network access and records every probe so tests can assert on
//! lookup behaviour.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory snapshot store backed by a `HashMap<commit, bytes>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    probes: Mutex<Vec<CommitId>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot directly, bypassing `store`.
    pub fn insert(&self, id: &CommitId, data: impl Into<Vec<u8>>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(id.as_str().to_string(), data.into());
    }

    /// Raw bytes stored for `id`, if any.
    pub fn get(&self, id: &CommitId) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(id.as_str()).cloned()
    }

    /// Commits probed via `contains`, in call order.
    pub fn probes(&self) -> Vec<CommitId> {
        self.probes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn contains(&self, id: &CommitId) -> StorageResult<bool> {
        let key = id.storage_key()?;
        self.probes.lock().unwrap().push(id.clone());
        Ok(self.blobs.lock().unwrap().contains_key(key))
    }

    async fn fetch(&self, id: &CommitId, dest: &Path) -> StorageResult<()> {
        let key = id.storage_key()?;
        let data = self
            .blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                commit: id.to_string(),
            })?;
        tokio::fs::write(dest, data)
            .await
            .map_err(|e| StorageError::io("fetch", id.as_str(), e))
    }

    async fn store(&self, id: &CommitId, blob: &Path) -> StorageResult<()> {
        let key = id.storage_key()?.to_string();
        let data = tokio::fs::read(blob)
            .await
            .map_err(|e| StorageError::io("store", id.as_str(), e))?;
        self.blobs.lock().unwrap().insert(key, data);
        Ok(())
    }
}
