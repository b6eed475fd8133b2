//! Snapshot-Store: commit-keyed build snapshot storage for deltabuild
//!
//! This crate provides the persistence layer for deltabuild. A snapshot is a
//! single archive blob of build outputs, stored under the id of the commit
//! it was built at.
//!
//! ## Layer 0 - Storage
//!
//! - [`SnapshotStore`]: backend-agnostic async trait
//! - [`FsSnapshotStore`]: one file per commit under a root directory
//! - [`RemoteSnapshotStore`]: one object per commit under `<bucket>/<commit>`
//! - [`fakes::MemorySnapshotStore`]: in-memory fake for tests

pub mod error;
pub mod fakes;
pub mod fs;
pub mod remote;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::FsSnapshotStore;
pub use remote::{RemoteConfig, RemoteSnapshotStore};
pub use storage_traits::{sha256_file, sha256_hex, CommitId, SnapshotStore, StorageResult};
