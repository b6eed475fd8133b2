//! Version-control integration: recent history and changed paths.
//!
//! Both providers shell out to the installed CLI. Paths returned by
//! [`Vcs::diff_files`] are relative to the directory the command ran in (the
//! repository root as configured), and changes outside it are not reported.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snapshot_store::CommitId;

use crate::error::{DeltaBuildError, Result};

/// Source of commit history and diffs.
pub trait Vcs: Send + Sync {
    fn name(&self) -> &'static str;

    /// Up to `max` commits reachable from the working copy's current
    /// revision, most recent first. Element 0 is the current commit.
    fn list_recent_commits(&self, root: &Path, max: usize) -> Result<Vec<CommitId>>;

    /// Paths that differ between `from` and `to`.
    fn diff_files(&self, root: &Path, from: &CommitId, to: &CommitId) -> Result<BTreeSet<PathBuf>>;
}

/// Which VCS CLI to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsProvider {
    #[default]
    Git,
    Mercurial,
}

impl VcsProvider {
    pub fn into_vcs(self) -> Box<dyn Vcs> {
        match self {
            VcsProvider::Git => Box::new(GitCli),
            VcsProvider::Mercurial => Box::new(MercurialCli),
        }
    }
}

impl fmt::Display for VcsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcsProvider::Git => f.write_str("git"),
            VcsProvider::Mercurial => f.write_str("hg"),
        }
    }
}

impl FromStr for VcsProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "git" => Ok(VcsProvider::Git),
            "hg" | "mercurial" => Ok(VcsProvider::Mercurial),
            other => Err(format!("unknown vcs provider '{other}' (expected git or hg)")),
        }
    }
}

/// Run `program args` in `dir` and return its stdout.
fn run(program: &str, args: &[&str], dir: &Path, operation: &'static str) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| DeltaBuildError::vcs(operation, format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeltaBuildError::vcs(
            operation,
            format!("{program} {} failed: {}", args.join(" "), stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn non_empty_lines(stdout: &str) -> impl Iterator<Item = &str> {
    stdout.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Git via the `git` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl Vcs for GitCli {
    fn name(&self) -> &'static str {
        "git"
    }

    fn list_recent_commits(&self, root: &Path, max: usize) -> Result<Vec<CommitId>> {
        let limit = format!("--max-count={max}");
        let stdout = run("git", &["rev-list", &limit, "HEAD"], root, "history")?;
        Ok(non_empty_lines(&stdout).map(CommitId::from).collect())
    }

    fn diff_files(&self, root: &Path, from: &CommitId, to: &CommitId) -> Result<BTreeSet<PathBuf>> {
        let stdout = run(
            "git",
            &[
                "-c",
                "core.quotepath=off",
                "diff",
                "--name-only",
                "--no-renames",
                "--relative",
                from.as_str(),
                to.as_str(),
            ],
            root,
            "diff",
        )?;
        Ok(non_empty_lines(&stdout).map(PathBuf::from).collect())
    }
}

/// Mercurial via the `hg` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct MercurialCli;

impl Vcs for MercurialCli {
    fn name(&self) -> &'static str {
        "hg"
    }

    fn list_recent_commits(&self, root: &Path, max: usize) -> Result<Vec<CommitId>> {
        let limit = max.to_string();
        let stdout = run(
            "hg",
            &["log", "-l", &limit, "-r", "reverse(::.)", "--template", "{node}\\n"],
            root,
            "history",
        )?;
        Ok(non_empty_lines(&stdout).map(CommitId::from).collect())
    }

    fn diff_files(&self, root: &Path, from: &CommitId, to: &CommitId) -> Result<BTreeSet<PathBuf>> {
        let stdout = run(
            "hg",
            &["status", "-n", "--rev", from.as_str(), "--rev", to.as_str(), "."],
            root,
            "diff",
        )?;
        Ok(non_empty_lines(&stdout).map(PathBuf::from).collect())
    }
}
