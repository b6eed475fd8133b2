//! deltabuild Core Library
//!
//! Decides which projects of a multi-project repository must be rebuilt
//! after a commit, and restores the outputs of the rest from the nearest
//! commit that has a stored snapshot.
//!
//! ```rust,ignore
//! use deltabuild_core::{BuildParameters, IncrementalBuilder};
//!
//! let builder = IncrementalBuilder::from_parameters(BuildParameters::default())?;
//! let plan = builder.plan().await?;
//! // ... build plan.impacted with the external build tool ...
//! builder.create_snapshot(&plan).await?;
//! ```

pub mod archive;
pub mod error;
pub mod graph;
pub mod impact;
pub mod orchestrator;
pub mod params;
pub mod parser;
pub mod project;
pub mod telemetry;
pub mod vcs;

pub use archive::{collect_outputs, pack, unpack, unpack_matching, ArchiveError, PackSummary, UnpackSummary};
pub use error::{DeltaBuildError, Result};
pub use graph::DependencyGraph;
pub use impact::{compute_impacted, owning_project, Impact};
pub use orchestrator::{IncrementalBuildInfo, IncrementalBuilder, SnapshotSummary};
pub use params::{BuildParameters, StorageBackend, DEFAULT_MAX_COMMITS_CHECK};
pub use parser::{MsBuildParser, StructureParser};
pub use project::{BuildConfiguration, Project, ProjectStructure};
pub use telemetry::init_tracing;
pub use vcs::{GitCli, MercurialCli, Vcs, VcsProvider};

pub use snapshot_store::{
    CommitId, FsSnapshotStore, RemoteConfig, RemoteSnapshotStore, SnapshotStore, StorageError,
};
