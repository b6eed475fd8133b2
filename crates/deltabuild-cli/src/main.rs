//! deltabuild - incremental builds for multi-project repositories
//!
//! ## Commands
//!
//! - `plan`: Restore reusable outputs and print the projects to rebuild
//! - `snapshot`: Store the build outputs of the current commit
//! - `restore`: Unpack a stored snapshot into the repository
//! - `impacted`: Impact analysis between two commits
//! - `projects`: List discovered projects in build order

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deltabuild_core::{
    BuildConfiguration, BuildParameters, CommitId, DependencyGraph, Impact, IncrementalBuildInfo,
    IncrementalBuilder, ProjectStructure, StorageBackend, VcsProvider, DEFAULT_MAX_COMMITS_CHECK,
};
use serde::Serialize;
use snapshot_store::RemoteConfig;
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "deltabuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental builds for multi-project repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Repository root
    #[arg(long, global = true, env = "DELTABUILD_ROOT", default_value = ".")]
    root: PathBuf,

    /// Snapshot directory for the filesystem backend (relative to the root)
    #[arg(long, global = true, env = "DELTABUILD_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Use the remote backend configured by DELTABUILD_REMOTE_URL,
    /// DELTABUILD_BUCKET and DELTABUILD_TOKEN
    #[arg(long, global = true, conflicts_with = "store_dir")]
    remote: bool,

    /// How many commits, current included, to search for a snapshot
    #[arg(long, global = true, env = "DELTABUILD_MAX_COMMITS", default_value_t = DEFAULT_MAX_COMMITS_CHECK)]
    max_commits: usize,

    /// Build configuration whose outputs are archived (release or debug)
    #[arg(long, global = true, default_value = "release")]
    configuration: BuildConfiguration,

    /// Version control system (git or hg)
    #[arg(long, global = true, default_value = "git")]
    vcs: VcsProvider,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Restore outputs of unimpacted projects and print the build plan
    Plan {
        /// Print the full plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Archive the build outputs of the current commit
    Snapshot,

    /// Unpack the snapshot of a commit into the repository root
    Restore {
        /// Commit whose snapshot to restore
        commit: String,
    },

    /// Show which projects changed between two commits
    Impacted {
        /// Older commit
        #[arg(long)]
        from: String,

        /// Newer commit (default: current commit)
        #[arg(long)]
        to: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List discovered projects with their dependencies
    Projects,
}

impl Cli {
    fn parameters(&self) -> BuildParameters {
        let storage = if self.remote {
            StorageBackend::Remote(RemoteConfig::from_env())
        } else if let Some(root) = &self.store_dir {
            StorageBackend::FileSystem { root: root.clone() }
        } else {
            StorageBackend::default()
        };

        BuildParameters::default()
            .with_root(self.root.clone())
            .with_vcs(self.vcs)
            .with_storage(storage)
            .with_max_commits_check(self.max_commits)
            .with_configuration(self.configuration)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    deltabuild_core::init_tracing(cli.json_logs, level);

    let builder = IncrementalBuilder::from_parameters(cli.parameters())
        .context("Failed to configure incremental builder")?;

    match cli.command {
        Commands::Plan { json } => cmd_plan(&builder, json).await,
        Commands::Snapshot => cmd_snapshot(&builder).await,
        Commands::Restore { commit } => cmd_restore(&builder, &commit).await,
        Commands::Impacted { from, to, json } => {
            cmd_impacted(&builder, &from, to.as_deref(), json)
        }
        Commands::Projects => cmd_projects(&builder),
    }
}

async fn cmd_plan(builder: &IncrementalBuilder, json: bool) -> Result<()> {
    let plan = builder
        .plan()
        .await
        .context("Failed to plan incremental build")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render_plan_text(&plan));
    }
    Ok(())
}

fn render_plan_text(plan: &IncrementalBuildInfo) -> String {
    let mut out = String::new();
    out.push_str(&format!("Commit:     {}\n", plan.current));
    match &plan.diff_base {
        Some(base) => out.push_str(&format!(
            "Restored:   {} ({} changed files)\n",
            base, plan.changed_files
        )),
        None => out.push_str("Restored:   nothing (full build)\n"),
    }
    out.push_str(&format!(
        "Impacted:   {} of {}\n",
        plan.impacted.len(),
        plan.structure.len()
    ));
    for name in plan.build_order() {
        if let Some(project) = plan.structure.get(name) {
            out.push_str(&format!("  {}\t{}\n", project.name, project.folder.display()));
        }
    }
    out
}

async fn cmd_snapshot(builder: &IncrementalBuilder) -> Result<()> {
    let summary = builder
        .snapshot_current()
        .await
        .context("Failed to store snapshot")?;

    println!(
        "Stored snapshot {} ({} files, {} bytes)",
        summary.commit.short(),
        summary.files,
        summary.bytes
    );
    Ok(())
}

async fn cmd_restore(builder: &IncrementalBuilder, commit: &str) -> Result<()> {
    let commit = CommitId::new(commit);
    let summary = builder
        .restore(&commit)
        .await
        .with_context(|| format!("Failed to restore snapshot {}", commit))?;

    println!(
        "Restored {} files from {} into {}",
        summary.extracted,
        commit.short(),
        builder.parameters().root.display()
    );
    Ok(())
}

#[derive(Serialize)]
struct ImpactReport<'a> {
    from: &'a str,
    to: Option<&'a str>,
    #[serde(flatten)]
    impact: &'a Impact,
}

fn cmd_impacted(
    builder: &IncrementalBuilder,
    from: &str,
    to: Option<&str>,
    json: bool,
) -> Result<()> {
    let to_commit = to.map(CommitId::new);
    let (structure, impact) = builder
        .impacted_between(&CommitId::new(from), to_commit.as_ref())
        .with_context(|| format!("Failed to compute impact since {}", from))?;

    if json {
        let report = ImpactReport {
            from,
            to,
            impact: &impact,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_impact_text(&structure, &impact));
    }
    Ok(())
}

fn render_impact_text(structure: &ProjectStructure, impact: &Impact) -> String {
    if impact.impacted.is_empty() {
        return "No projects impacted\n".to_string();
    }
    let mut out = String::new();
    for name in &impact.impacted {
        if let Some(project) = structure.get(name) {
            out.push_str(&format!("{}\t{}\n", project.name, project.folder.display()));
        }
    }
    out
}

fn cmd_projects(builder: &IncrementalBuilder) -> Result<()> {
    let structure = builder
        .structure()
        .context("Failed to parse project structure")?;
    info!(projects = structure.len(), "parsed project structure");
    print!("{}", render_projects_text(&structure));
    Ok(())
}

fn render_projects_text(structure: &ProjectStructure) -> String {
    let graph = DependencyGraph::new(structure);
    let order: Vec<&str> = match graph.topological_order() {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, "listing projects in name order");
            structure.projects().map(|p| p.name.as_str()).collect()
        }
    };

    let mut out = String::new();
    for name in order {
        let Some(project) = structure.get(name) else {
            continue;
        };
        out.push_str(&format!("{} ({})", project.name, project.folder.display()));
        if let Some(framework) = &project.framework {
            out.push_str(&format!(" [{}]", framework));
        }
        out.push('\n');
        for dep in &project.dependencies {
            out.push_str(&format!("  -> {}\n", dep));
        }
    }
    out
}
