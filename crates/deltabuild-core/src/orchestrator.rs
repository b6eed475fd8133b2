//! Incremental build planning.
//!
//! One [`IncrementalBuilder`] serves one invocation. [`IncrementalBuilder::plan`]
//! runs parse → history → snapshot lookup → diff → impact → restore in that
//! order and returns an [`IncrementalBuildInfo`]; the external build then
//! compiles the impacted projects, after which
//! [`IncrementalBuilder::create_snapshot`] archives the outputs of the whole
//! structure under the current commit.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use snapshot_store::{CommitId, SnapshotStore};
use tracing::{debug, info, warn};

use crate::archive::{self, UnpackSummary};
use crate::error::{DeltaBuildError, Result};
use crate::graph::DependencyGraph;
use crate::impact::{compute_impacted, owning_project, Impact};
use crate::params::BuildParameters;
use crate::parser::{MsBuildParser, StructureParser};
use crate::project::{Project, ProjectStructure};
use crate::vcs::Vcs;

const BLOB_NAME: &str = "snapshot.tar.gz";

/// The build plan for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct IncrementalBuildInfo {
    /// Commit being built.
    pub current: CommitId,
    /// Commit whose snapshot was restored; `None` means full build.
    pub diff_base: Option<CommitId>,
    pub structure: ProjectStructure,
    pub impacted: BTreeSet<String>,
    pub unimpacted: BTreeSet<String>,
    /// Files that differ between `current` and `diff_base`.
    pub changed_files: usize,
    /// Dependency cycles found in the structure, as name paths.
    pub cycles: Vec<Vec<String>>,
    pub parameters: BuildParameters,
}

impl IncrementalBuildInfo {
    pub fn is_full_build(&self) -> bool {
        self.diff_base.is_none()
    }

    /// Impacted projects, for handing to the build tool.
    pub fn impacted_projects(&self) -> impl Iterator<Item = &Project> {
        self.impacted
            .iter()
            .filter_map(|name| self.structure.get(name))
    }

    /// Impacted project names with dependencies first. Falls back to name
    /// order when the structure has cycles.
    pub fn build_order(&self) -> Vec<&str> {
        match DependencyGraph::new(&self.structure).topological_order() {
            Ok(order) => order
                .into_iter()
                .filter(|name| self.impacted.contains(*name))
                .collect(),
            Err(_) => self.impacted.iter().map(String::as_str).collect(),
        }
    }
}

/// Outcome of [`IncrementalBuilder::create_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub commit: CommitId,
    pub files: usize,
    pub bytes: u64,
}

/// Drives one incremental build invocation.
pub struct IncrementalBuilder {
    params: BuildParameters,
    vcs: Box<dyn Vcs>,
    parser: Box<dyn StructureParser>,
    store: Arc<dyn SnapshotStore>,
}

impl IncrementalBuilder {
    pub fn new(
        params: BuildParameters,
        vcs: Box<dyn Vcs>,
        parser: Box<dyn StructureParser>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            params,
            vcs,
            parser,
            store,
        }
    }

    /// Resolve the VCS provider and storage backend named in `params`.
    pub fn from_parameters(params: BuildParameters) -> Result<Self> {
        let store = params.storage.open(&params.root)?;
        let vcs = params.vcs.into_vcs();
        info!(vcs = vcs.name(), store = %store.describe(), "configured incremental builder");
        Ok(Self::new(params, vcs, Box::new(MsBuildParser), store))
    }

    pub fn parameters(&self) -> &BuildParameters {
        &self.params
    }

    fn current_commit(&self) -> Result<CommitId> {
        self.vcs
            .list_recent_commits(&self.params.root, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| DeltaBuildError::vcs("history", "repository has no commits"))
    }

    /// Compute the build plan and restore reusable outputs.
    pub async fn plan(&self) -> Result<IncrementalBuildInfo> {
        let root = &self.params.root;

        let structure = self.parser.parse(root)?;
        info!(projects = structure.len(), root = %root.display(), "parsed project structure");

        let cycles = DependencyGraph::new(&structure).find_cycles();
        for cycle in &cycles {
            warn!(cycle = %cycle.join(" -> "), "dependency cycle detected between projects");
        }

        // The current commit is always needed, even with a zero lookup window.
        let window = self.params.max_commits_check.max(1);
        let history = self.vcs.list_recent_commits(root, window)?;
        let (current, previous) = history
            .split_first()
            .ok_or_else(|| DeltaBuildError::vcs("history", "repository has no commits"))?;
        debug!(current = %current, candidates = previous.len(), "enumerated history");

        let diff_base = self.store.find_nearest(previous).await?;

        let (impact, changed_files) = match &diff_base {
            Some(base) => {
                let changed = self.vcs.diff_files(root, current, base)?;
                let impact = compute_impacted(&structure, &changed);
                info!(
                    base = %base.short(),
                    changed = changed.len(),
                    impacted = impact.impacted.len(),
                    unimpacted = impact.unimpacted.len(),
                    "found snapshot, computing incremental build"
                );

                let restored = self.restore_unimpacted(base, &structure, &impact).await?;
                info!(
                    base = %base.short(),
                    extracted = restored.extracted,
                    skipped = restored.skipped,
                    "restored outputs of unimpacted projects"
                );
                (impact, changed.len())
            }
            None => {
                warn!(
                    searched = previous.len(),
                    "no snapshot found in recent history, full build required"
                );
                (Impact::full(&structure), 0)
            }
        };

        Ok(IncrementalBuildInfo {
            current: current.clone(),
            diff_base,
            structure,
            impacted: impact.impacted,
            unimpacted: impact.unimpacted,
            changed_files,
            cycles,
            parameters: self.params.clone(),
        })
    }

    /// Fetch `commit`'s snapshot and unpack the entries accepted by `keep`
    /// into the repository root.
    async fn restore_matching<F>(&self, commit: &CommitId, keep: F) -> Result<UnpackSummary>
    where
        F: FnMut(&Path) -> bool,
    {
        let scratch = tempfile::Builder::new().prefix("deltabuild-").tempdir()?;
        let blob = scratch.path().join(BLOB_NAME);

        self.store.fetch(commit, &blob).await?;
        Ok(archive::unpack_matching(&blob, &self.params.root, keep)?)
    }

    async fn restore_unimpacted(
        &self,
        commit: &CommitId,
        structure: &ProjectStructure,
        impact: &Impact,
    ) -> Result<UnpackSummary> {
        self.restore_matching(commit, |entry| {
            owning_project(structure, entry)
                .is_some_and(|project| impact.unimpacted.contains(&project.name))
        })
        .await
    }

    /// Restore every file of `commit`'s snapshot into the repository root.
    pub async fn restore(&self, commit: &CommitId) -> Result<UnpackSummary> {
        let summary = self.restore_matching(commit, |_| true).await?;
        info!(commit = %commit.short(), extracted = summary.extracted, "restored snapshot");
        Ok(summary)
    }

    /// Archive the outputs of every project in `structure` and store them
    /// under `commit`.
    async fn snapshot_structure(
        &self,
        commit: &CommitId,
        structure: &ProjectStructure,
    ) -> Result<SnapshotSummary> {
        let outputs = archive::collect_outputs(structure, self.params.configuration)?;
        if outputs.is_empty() {
            warn!(
                configuration = %self.params.configuration,
                "no build outputs found, storing an empty snapshot"
            );
        }

        let scratch = tempfile::Builder::new().prefix("deltabuild-").tempdir()?;
        let blob = scratch.path().join(BLOB_NAME);
        let packed = archive::pack(structure.root(), &outputs, &blob)?;
        self.store.store(commit, &blob).await?;

        info!(
            commit = %commit.short(),
            files = packed.files,
            bytes = packed.bytes,
            store = %self.store.describe(),
            "stored snapshot"
        );
        Ok(SnapshotSummary {
            commit: commit.clone(),
            files: packed.files,
            bytes: packed.bytes,
        })
    }

    /// Snapshot the outputs of a finished build planned by [`Self::plan`].
    pub async fn create_snapshot(&self, info: &IncrementalBuildInfo) -> Result<SnapshotSummary> {
        self.snapshot_structure(&info.current, &info.structure)
            .await
    }

    /// Snapshot the current checkout without a prior plan.
    pub async fn snapshot_current(&self) -> Result<SnapshotSummary> {
        let structure = self.parser.parse(&self.params.root)?;
        let current = self.current_commit()?;
        self.snapshot_structure(&current, &structure).await
    }

    /// Impact of the changes between two commits, without touching the store.
    /// `to` defaults to the current commit.
    pub fn impacted_between(
        &self,
        from: &CommitId,
        to: Option<&CommitId>,
    ) -> Result<(ProjectStructure, Impact)> {
        let structure = self.parser.parse(&self.params.root)?;
        let to = match to {
            Some(commit) => commit.clone(),
            None => self.current_commit()?,
        };
        let changed = self.vcs.diff_files(&self.params.root, &to, from)?;
        let impact = compute_impacted(&structure, &changed);
        Ok((structure, impact))
    }

    /// Parse the structure only.
    pub fn structure(&self) -> Result<ProjectStructure> {
        self.parser.parse(&self.params.root)
    }
}
