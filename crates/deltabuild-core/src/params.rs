//! Invocation parameters.
//!
//! [`BuildParameters::default`] is the one default configuration; callers
//! override fields with the `with_*` builders, which take and return the
//! value. Nothing here is global or mutable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snapshot_store::{FsSnapshotStore, RemoteConfig, RemoteSnapshotStore, SnapshotStore};

use crate::error::Result;
use crate::project::BuildConfiguration;
use crate::vcs::VcsProvider;

pub const DEFAULT_MAX_COMMITS_CHECK: usize = 20;
pub const DEFAULT_STORE_DIR: &str = ".deltabuild/snapshots";

/// Where snapshots live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per commit under `root`. Relative roots resolve against the
    /// repository root.
    FileSystem { root: PathBuf },
    /// One object per commit under `<bucket>/<commit>`.
    Remote(RemoteConfig),
}

impl StorageBackend {
    /// Build the store for this backend. Called once per invocation.
    pub fn open(&self, repository_root: &Path) -> Result<Arc<dyn SnapshotStore>> {
        Ok(match self {
            StorageBackend::FileSystem { root } => {
                Arc::new(FsSnapshotStore::new(repository_root.join(root)))
            }
            StorageBackend::Remote(config) => Arc::new(RemoteSnapshotStore::new(config.clone())?),
        })
    }
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::FileSystem {
            root: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

/// Immutable configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Repository root (where the VCS runs and projects are discovered).
    pub root: PathBuf,
    pub vcs: VcsProvider,
    pub storage: StorageBackend,
    /// How many commits, current included, to inspect for a snapshot.
    pub max_commits_check: usize,
    pub configuration: BuildConfiguration,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            vcs: VcsProvider::default(),
            storage: StorageBackend::default(),
            max_commits_check: DEFAULT_MAX_COMMITS_CHECK,
            configuration: BuildConfiguration::default(),
        }
    }
}

impl BuildParameters {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_vcs(mut self, vcs: VcsProvider) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_max_commits_check(mut self, max: usize) -> Self {
        self.max_commits_check = max;
        self
    }

    pub fn with_configuration(mut self, configuration: BuildConfiguration) -> Self {
        self.configuration = configuration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = BuildParameters::default();
        assert_eq!(params.root, PathBuf::from("."));
        assert_eq!(params.vcs, VcsProvider::Git);
        assert_eq!(params.max_commits_check, 20);
        assert_eq!(params.configuration, BuildConfiguration::Release);
        assert_eq!(
            params.storage,
            StorageBackend::FileSystem {
                root: PathBuf::from(".deltabuild/snapshots")
            }
        );
    }

    #[test]
    fn test_builders_override_without_touching_default() {
        let params = BuildParameters::default()
            .with_root("/repo")
            .with_vcs(VcsProvider::Mercurial)
            .with_max_commits_check(5)
            .with_configuration(BuildConfiguration::Debug);

        assert_eq!(params.root, PathBuf::from("/repo"));
        assert_eq!(params.vcs, VcsProvider::Mercurial);
        assert_eq!(params.max_commits_check, 5);
        assert_eq!(BuildParameters::default().max_commits_check, 20);
    }

    #[test]
    fn test_filesystem_backend_resolves_against_repo_root() {
        let store = StorageBackend::default()
            .open(Path::new("/repo"))
            .unwrap();
        assert_eq!(store.describe(), "filesystem:/repo/.deltabuild/snapshots");
    }

    #[test]
    fn test_remote_backend_opens() {
        let backend = StorageBackend::Remote(RemoteConfig::new("http://localhost:9000", "snaps"));
        let store = backend.open(Path::new("/repo")).unwrap();
        assert_eq!(store.describe(), "remote:http://localhost:9000/snaps");
    }

    #[test]
    fn test_parameters_serialize_backend_kind() {
        let json = serde_json::to_value(BuildParameters::default()).unwrap();
        assert_eq!(json["storage"]["kind"], "filesystem");
        assert_eq!(json["vcs"], "git");
    }
}
