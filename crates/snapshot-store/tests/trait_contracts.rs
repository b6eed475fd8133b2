//! Trait contract tests for SnapshotStore.
//!
//! Every backend is checked against the same behavioural contract:
//! overwrite-on-store, NotFound on missing fetch, and recency-ordered
//! nearest-snapshot lookup. The remote backend runs against a local
//! in-memory object server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use snapshot_store::fakes::MemorySnapshotStore;
use snapshot_store::{
    sha256_hex, CommitId, FsSnapshotStore, RemoteConfig, RemoteSnapshotStore, SnapshotStore,
    StorageError, StorageResult,
};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn ids(raw: &[&str]) -> Vec<CommitId> {
    raw.iter().map(|s| CommitId::new(*s)).collect()
}

fn write_blob(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

async fn check_overwrite(store: &dyn SnapshotStore, scratch: &Path) {
    let id = CommitId::new("c1");
    let old = write_blob(scratch, "old.bin", b"old content");
    let new = write_blob(scratch, "new.bin", b"new content");

    store.store(&id, &old).await.unwrap();
    store.store(&id, &new).await.unwrap();

    let out = scratch.join("fetched.bin");
    store.fetch(&id, &out).await.unwrap();
    assert_eq!(std::fs::read(out).unwrap(), b"new content");
}

async fn check_fetch_missing(store: &dyn SnapshotStore, scratch: &Path) {
    let err = store
        .fetch(&CommitId::new("missing"), &scratch.join("never"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
    assert!(!scratch.join("never").exists());
}

async fn check_find_nearest(store: &dyn SnapshotStore, scratch: &Path) {
    let blob = write_blob(scratch, "blob.bin", b"snap");
    store.store(&CommitId::new("c3"), &blob).await.unwrap();
    store.store(&CommitId::new("c5"), &blob).await.unwrap();

    let history = ids(&["c2", "c3", "c4", "c5"]);
    assert_eq!(
        store.find_nearest(&history).await.unwrap(),
        Some(CommitId::new("c3"))
    );

    let none = ids(&["c6", "c7"]);
    assert_eq!(store.find_nearest(&none).await.unwrap(), None);
    assert_eq!(store.find_nearest(&[]).await.unwrap(), None);
}

// ===========================================================================
// MemorySnapshotStore
// ===========================================================================

#[tokio::test]
async fn memory_store_overwrites() {
    let scratch = tempfile::tempdir().unwrap();
    check_overwrite(&MemorySnapshotStore::new(), scratch.path()).await;
}

#[tokio::test]
async fn memory_fetch_missing_is_not_found() {
    let scratch = tempfile::tempdir().unwrap();
    check_fetch_missing(&MemorySnapshotStore::new(), scratch.path()).await;
}

#[tokio::test]
async fn memory_find_nearest_prefers_most_recent() {
    let scratch = tempfile::tempdir().unwrap();
    check_find_nearest(&MemorySnapshotStore::new(), scratch.path()).await;
}

#[tokio::test]
async fn memory_find_nearest_probes_every_candidate() {
    let store = MemorySnapshotStore::new();
    store.insert(&CommitId::new("b"), b"x".to_vec());
    let found = store.find_nearest(&ids(&["a", "b", "c"])).await.unwrap();

    assert_eq!(found, Some(CommitId::new("b")));
    let mut probed = store.probes();
    probed.sort();
    assert_eq!(probed, ids(&["a", "b", "c"]));
}

// ===========================================================================
// FsSnapshotStore
// ===========================================================================

#[tokio::test]
async fn fs_store_overwrites() {
    let scratch = tempfile::tempdir().unwrap();
    let store = FsSnapshotStore::new(scratch.path().join("store"));
    check_overwrite(&store, scratch.path()).await;
}

#[tokio::test]
async fn fs_fetch_missing_is_not_found() {
    let scratch = tempfile::tempdir().unwrap();
    let store = FsSnapshotStore::new(scratch.path().join("store"));
    check_fetch_missing(&store, scratch.path()).await;
}

#[tokio::test]
async fn fs_find_nearest_prefers_most_recent() {
    let scratch = tempfile::tempdir().unwrap();
    let store = FsSnapshotStore::new(scratch.path().join("store"));
    check_find_nearest(&store, scratch.path()).await;
}

#[tokio::test]
async fn fs_store_is_visible_to_a_second_handle() {
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("store");
    let blob = write_blob(scratch.path(), "blob.bin", b"shared");

    FsSnapshotStore::new(&root)
        .store(&CommitId::new("c1"), &blob)
        .await
        .unwrap();

    let reopened = FsSnapshotStore::new(&root);
    assert!(reopened.contains(&CommitId::new("c1")).await.unwrap());
}

// ===========================================================================
// Recency ordering under concurrent probes
// ===========================================================================

/// Store whose probes finish in reverse list order: the earlier a commit is
/// in the candidate list, the longer its probe takes.
struct SlowFirstStore {
    present: Vec<CommitId>,
    order: Vec<CommitId>,
}

#[async_trait]
impl SnapshotStore for SlowFirstStore {
    fn describe(&self) -> String {
        "slow-first".to_string()
    }

    async fn contains(&self, id: &CommitId) -> StorageResult<bool> {
        let rank = self.order.iter().position(|c| c == id).unwrap_or(0);
        let delay = (self.order.len() - rank) as u64 * 15;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(self.present.contains(id))
    }

    async fn fetch(&self, id: &CommitId, _dest: &Path) -> StorageResult<()> {
        Err(StorageError::NotFound {
            commit: id.to_string(),
        })
    }

    async fn store(&self, _id: &CommitId, _blob: &Path) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn find_nearest_returns_earliest_hit_not_first_completed() {
    let order = ids(&["c1", "c2", "c3", "c4"]);
    let store = SlowFirstStore {
        present: ids(&["c2", "c4"]),
        order: order.clone(),
    };

    // c4's probe completes first, but c2 is more recent.
    let found = store.find_nearest(&order).await.unwrap();
    assert_eq!(found, Some(CommitId::new("c2")));
}

/// Store with scripted probe outcomes: `present` answer true, `failing`
/// answer with an error, everything else answers false.
struct ScriptedProbeStore {
    present: Vec<CommitId>,
    failing: Vec<CommitId>,
}

#[async_trait]
impl SnapshotStore for ScriptedProbeStore {
    fn describe(&self) -> String {
        "scripted-probes".to_string()
    }

    async fn contains(&self, id: &CommitId) -> StorageResult<bool> {
        if self.failing.contains(id) {
            return Err(StorageError::Remote {
                operation: "probe",
                commit: id.to_string(),
                detail: "HTTP 503".to_string(),
            });
        }
        Ok(self.present.contains(id))
    }

    async fn fetch(&self, _id: &CommitId, _dest: &Path) -> StorageResult<()> {
        unreachable!()
    }

    async fn store(&self, _id: &CommitId, _blob: &Path) -> StorageResult<()> {
        unreachable!()
    }
}

#[tokio::test]
async fn find_nearest_propagates_probe_failures() {
    let store = ScriptedProbeStore {
        present: vec![],
        failing: ids(&["c1", "c2"]),
    };
    let err = store.find_nearest(&ids(&["c1", "c2"])).await.unwrap_err();
    assert!(matches!(err, StorageError::Remote { .. }));
}

#[tokio::test]
async fn find_nearest_ignores_failures_older_than_the_hit() {
    let store = ScriptedProbeStore {
        present: ids(&["c1"]),
        failing: ids(&["c2"]),
    };
    let found = store.find_nearest(&ids(&["c1", "c2"])).await.unwrap();
    assert_eq!(found, Some(CommitId::new("c1")));
}

#[tokio::test]
async fn find_nearest_fails_when_a_newer_probe_fails() {
    let store = ScriptedProbeStore {
        present: ids(&["c2"]),
        failing: ids(&["c1"]),
    };
    let err = store.find_nearest(&ids(&["c1", "c2"])).await.unwrap_err();
    assert!(matches!(err, StorageError::Remote { ref commit, .. } if commit == "c1"));
}

// ===========================================================================
// RemoteSnapshotStore
// ===========================================================================

/// In-memory object server: HEAD/GET/PUT/DELETE on `/<bucket>/<key>`.
/// Requests whose method and path suffix are listed in `failing` get a 503.
#[derive(Clone, Default)]
struct ObjectServer {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failing: Arc<Mutex<Vec<(&'static str, &'static str)>>>,
}

impl ObjectServer {
    fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    fn put_object(&self, path: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    fn fail(&self, method: &'static str, suffix: &'static str) {
        self.failing.lock().unwrap().push((method, suffix));
    }
}

impl Respond for ObjectServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let method = request.method.as_str();
        let path = request.url.path().to_string();

        let failing = self.failing.lock().unwrap();
        if failing
            .iter()
            .any(|(m, suffix)| *m == method && path.ends_with(suffix))
        {
            return ResponseTemplate::new(503);
        }

        let mut objects = self.objects.lock().unwrap();
        match method {
            "HEAD" if objects.contains_key(&path) => ResponseTemplate::new(200),
            "GET" => match objects.get(&path) {
                Some(data) => ResponseTemplate::new(200).set_body_bytes(data.clone()),
                None => ResponseTemplate::new(404),
            },
            "PUT" => {
                objects.insert(path, request.body.clone());
                ResponseTemplate::new(200)
            }
            "DELETE" if objects.remove(&path).is_some() => ResponseTemplate::new(204),
            "HEAD" | "DELETE" => ResponseTemplate::new(404),
            _ => ResponseTemplate::new(405),
        }
    }
}

async fn remote_store() -> (MockServer, ObjectServer, RemoteSnapshotStore) {
    let server = MockServer::start().await;
    let objects = ObjectServer::default();
    Mock::given(any())
        .respond_with(objects.clone())
        .mount(&server)
        .await;
    let store = RemoteSnapshotStore::new(RemoteConfig::new(&server.uri(), "snapshots")).unwrap();
    (server, objects, store)
}

#[tokio::test]
async fn remote_store_overwrites() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, _objects, store) = remote_store().await;
    check_overwrite(&store, scratch.path()).await;
}

#[tokio::test]
async fn remote_fetch_missing_is_not_found() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, _objects, store) = remote_store().await;
    check_fetch_missing(&store, scratch.path()).await;
}

#[tokio::test]
async fn remote_find_nearest_prefers_most_recent() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, _objects, store) = remote_store().await;
    check_find_nearest(&store, scratch.path()).await;
}

#[tokio::test]
async fn remote_layout_is_bucket_slash_commit_with_checksum() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, objects, store) = remote_store().await;
    let blob = write_blob(scratch.path(), "blob.bin", b"outputs");

    store.store(&CommitId::new("abc"), &blob).await.unwrap();

    assert_eq!(objects.object("/snapshots/abc").unwrap(), b"outputs");
    assert_eq!(
        objects.object("/snapshots/abc.sha256").unwrap(),
        sha256_hex(b"outputs").into_bytes()
    );
}

#[tokio::test]
async fn remote_tampered_object_is_reported_corrupt() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, objects, store) = remote_store().await;
    let blob = write_blob(scratch.path(), "blob.bin", b"original");
    let id = CommitId::new("c1");
    store.store(&id, &blob).await.unwrap();

    objects.put_object("/snapshots/c1", b"tampered");

    let out = scratch.path().join("out");
    let err = store.fetch(&id, &out).await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }));
    assert!(!out.exists());
}

#[tokio::test]
async fn remote_failed_checksum_upload_leaves_no_stale_checksum() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, objects, store) = remote_store().await;
    let id = CommitId::new("c1");
    let v1 = write_blob(scratch.path(), "v1.bin", b"first build");
    let v2 = write_blob(scratch.path(), "v2.bin", b"second build");
    store.store(&id, &v1).await.unwrap();

    objects.fail("PUT", ".sha256");
    let err = store.store(&id, &v2).await.unwrap_err();
    assert!(matches!(err, StorageError::Remote { operation: "store", .. }));
    assert!(objects.object("/snapshots/c1.sha256").is_none());

    let out = scratch.path().join("out");
    store.fetch(&id, &out).await.unwrap();
    assert_eq!(std::fs::read(out).unwrap(), b"second build");
}

#[tokio::test]
async fn remote_probe_error_is_a_storage_error() {
    let (_server, objects, store) = remote_store().await;
    objects.fail("HEAD", "/c1");

    let err = store.contains(&CommitId::new("c1")).await.unwrap_err();
    assert!(matches!(err, StorageError::Remote { operation: "probe", .. }));
}

#[tokio::test]
async fn remote_find_nearest_tolerates_failures_past_the_hit() {
    let scratch = tempfile::tempdir().unwrap();
    let (_server, objects, store) = remote_store().await;
    let blob = write_blob(scratch.path(), "blob.bin", b"snap");
    store.store(&CommitId::new("c1"), &blob).await.unwrap();
    objects.fail("HEAD", "/c2");

    let found = store.find_nearest(&ids(&["c1", "c2"])).await.unwrap();
    assert_eq!(found, Some(CommitId::new("c1")));
    assert!(store.find_nearest(&ids(&["c2", "c1"])).await.is_err());
}
