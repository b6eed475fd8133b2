//! Project model: build units and the validated structure of a repository.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeltaBuildError, Result};

/// Build configuration whose outputs are archived and restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildConfiguration {
    #[default]
    Release,
    Debug,
}

impl BuildConfiguration {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildConfiguration::Release => "Release",
            BuildConfiguration::Debug => "Debug",
        }
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildConfiguration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(BuildConfiguration::Release),
            "debug" => Ok(BuildConfiguration::Debug),
            other => Err(format!(
                "unknown build configuration '{other}' (expected Release or Debug)"
            )),
        }
    }
}

/// A single build unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name.
    pub name: String,
    /// Project folder, relative to the repository root.
    pub folder: PathBuf,
    /// Target framework / platform identifier, when declared.
    pub framework: Option<String>,
    /// Names of projects this one depends on directly.
    pub dependencies: BTreeSet<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            framework: None,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.insert(name.into());
        self
    }

    /// Output directories for `configuration`, relative to the repository root.
    pub fn output_dirs(&self, configuration: BuildConfiguration) -> [PathBuf; 2] {
        [
            self.folder.join("bin").join(configuration.as_str()),
            self.folder.join("obj").join(configuration.as_str()),
        ]
    }
}

/// Every project of a repository, keyed by name.
///
/// Construction validates that every declared dependency names a project in
/// the structure. The structure is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStructure {
    root: PathBuf,
    projects: BTreeMap<String, Project>,
}

impl ProjectStructure {
    pub fn new(root: impl Into<PathBuf>, projects: impl IntoIterator<Item = Project>) -> Result<Self> {
        let root = root.into();
        let mut map = BTreeMap::new();
        for project in projects {
            if let Some(previous) = map.insert(project.name.clone(), project) {
                return Err(DeltaBuildError::parse(
                    root.join(&previous.folder),
                    format!("duplicate project name '{}'", previous.name),
                ));
            }
        }

        for project in map.values() {
            if let Some(missing) = project
                .dependencies
                .iter()
                .find(|dep| !map.contains_key(dep.as_str()))
            {
                return Err(DeltaBuildError::MalformedGraph {
                    project: project.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        Ok(Self {
            root,
            projects: map,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// Projects in name order.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.projects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
