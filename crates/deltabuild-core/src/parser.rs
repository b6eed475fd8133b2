//! Project structure discovery.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{DeltaBuildError, Result};
use crate::project::{Project, ProjectStructure};

/// Builds a [`ProjectStructure`] from a repository checkout.
pub trait StructureParser: Send + Sync {
    fn parse(&self, root: &Path) -> Result<ProjectStructure>;
}

const PROJECT_EXTENSIONS: &[&str] = &["csproj", "fsproj", "vbproj"];
const SKIPPED_DIRS: &[&str] = &["bin", "obj", "node_modules", "packages"];

fn target_framework_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<TargetFrameworks?>\s*([^<]+?)\s*</TargetFrameworks?>").expect("valid regex")
    })
}

fn project_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<ProjectReference\b[^>]*?\bInclude\s*=\s*["']([^"']+)["']"#)
            .expect("valid regex")
    })
}

/// MSBuild project discovery (`*.csproj`, `*.fsproj`, `*.vbproj`).
///
/// Project name is the file stem, folder is the directory holding the file,
/// framework comes from `<TargetFramework>` (first entry of
/// `<TargetFrameworks>`), dependencies from `<ProjectReference Include=...>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsBuildParser;

impl MsBuildParser {
    fn is_skipped(entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
    }

    fn discover(root: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !Self::is_skipped(e));

        for entry in walker {
            let entry = entry.map_err(|e| DeltaBuildError::parse(root, e.to_string()))?;
            let is_project = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| PROJECT_EXTENSIONS.contains(&ext));
            if is_project {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }
}

/// Resolve `.` and `..` lexically; does not touch the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

struct Declaration {
    file: PathBuf,
    project: Project,
    references: Vec<PathBuf>,
}

fn read_declaration(root: &Path, file: &Path) -> Result<Declaration> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| DeltaBuildError::parse(file, format!("unreadable project file: {e}")))?;

    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| DeltaBuildError::parse(file, "project file has no name"))?;
    let dir = file.parent().unwrap_or(root);
    let folder = dir.strip_prefix(root).unwrap_or(dir).to_path_buf();

    let mut project = Project::new(name, folder.clone());
    if let Some(caps) = target_framework_re().captures(&content) {
        if let Some(first) = caps[1].split(';').map(str::trim).find(|f| !f.is_empty()) {
            project = project.with_framework(first);
        }
    }

    let references = project_reference_re()
        .captures_iter(&content)
        .map(|caps| normalize(&folder.join(caps[1].replace('\\', "/"))))
        .collect();

    Ok(Declaration {
        file: file.to_path_buf(),
        project,
        references,
    })
}

impl StructureParser for MsBuildParser {
    fn parse(&self, root: &Path) -> Result<ProjectStructure> {
        if !root.is_dir() {
            return Err(DeltaBuildError::parse(root, "repository root is not a directory"));
        }

        let declarations = Self::discover(root)?
            .iter()
            .map(|file| read_declaration(root, file))
            .collect::<Result<Vec<_>>>()?;

        let by_path: HashMap<PathBuf, String> = declarations
            .iter()
            .map(|d| {
                let rel = d.file.strip_prefix(root).unwrap_or(&d.file);
                (normalize(rel), d.project.name.clone())
            })
            .collect();

        let mut projects = Vec::with_capacity(declarations.len());
        for decl in declarations {
            let mut project = decl.project;
            for reference in &decl.references {
                let dep = by_path.get(reference).ok_or_else(|| {
                    DeltaBuildError::parse(
                        &decl.file,
                        format!("reference to unknown project {}", reference.display()),
                    )
                })?;
                project = project.with_dependency(dep.clone());
            }
            debug!(
                project = %project.name,
                folder = %project.folder.display(),
                dependencies = project.dependencies.len(),
                "discovered project"
            );
            projects.push(project);
        }

        ProjectStructure::new(root, projects)
    }
}
