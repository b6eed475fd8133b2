//! Change impact analysis: which projects a set of changed files forces to
//! rebuild.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::project::{Project, ProjectStructure};

/// Partition of a structure's projects into impacted and unimpacted.
///
/// The two sets are disjoint and together cover every project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    pub impacted: BTreeSet<String>,
    pub unimpacted: BTreeSet<String>,
}

impl Impact {
    /// Every project impacted (no usable snapshot).
    pub fn full(structure: &ProjectStructure) -> Self {
        Self {
            impacted: structure.names(),
            unimpacted: BTreeSet::new(),
        }
    }

    pub fn is_impacted(&self, name: &str) -> bool {
        self.impacted.contains(name)
    }
}

/// `path` relative to `root`, with `.` components dropped.
fn relative_to(root: &Path, path: &Path) -> PathBuf {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).unwrap_or(path)
    } else {
        path
    };
    rel.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// The project owning `path`: the one whose folder is the longest
/// component-wise prefix of it. Equal folders resolve to the first name.
pub fn owning_project<'s>(structure: &'s ProjectStructure, path: &Path) -> Option<&'s Project> {
    let rel = relative_to(structure.root(), path);

    structure
        .projects()
        .filter(|p| rel.starts_with(relative_to(structure.root(), &p.folder)))
        .max_by(|a, b| {
            a.folder
                .components()
                .count()
                .cmp(&b.folder.components().count())
                .then_with(|| b.name.cmp(&a.name))
        })
}

/// Compute the impacted/unimpacted partition for `changed_files`.
///
/// Each changed file seeds its owning project; files under no project folder
/// are skipped. The impacted set is the seeds plus every project that depends
/// on one of them, directly or transitively.
pub fn compute_impacted<I, P>(structure: &ProjectStructure, changed_files: I) -> Impact
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seeds: BTreeSet<&str> = BTreeSet::new();
    let mut unmatched = 0usize;

    for file in changed_files {
        let file = file.as_ref();
        match owning_project(structure, file) {
            Some(project) => {
                seeds.insert(project.name.as_str());
            }
            None => {
                unmatched += 1;
                debug!(path = %file.display(), "changed file belongs to no project, ignoring");
            }
        }
    }

    let graph = DependencyGraph::new(structure);
    let impacted: BTreeSet<String> = graph
        .dependents_closure(seeds.iter().copied())
        .into_iter()
        .map(str::to_string)
        .collect();
    let unimpacted = structure
        .names()
        .into_iter()
        .filter(|name| !impacted.contains(name))
        .collect();

    debug!(
        seeds = seeds.len(),
        impacted = impacted.len(),
        unmatched,
        "computed change impact"
    );

    Impact {
        impacted,
        unimpacted,
    }
}
