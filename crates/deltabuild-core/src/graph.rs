//! Project dependency graph.
//!
//! Derived on demand from a [`ProjectStructure`]. An edge `A → B` means
//! "A depends on B". Both directions are indexed: `upstream` (what a project
//! depends on) and `downstream` (who depends on a project). Impact analysis
//! walks `downstream`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{DeltaBuildError, Result};
use crate::project::ProjectStructure;

/// Directed dependency graph over the projects of a structure.
///
/// Borrowed from the structure it was built from; iteration order is by
/// project name everywhere, so results are deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph<'a> {
    /// `project → {dependency, ...}`
    upstream: BTreeMap<&'a str, BTreeSet<&'a str>>,
    /// `project → {dependent, ...}`
    downstream: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(structure: &'a ProjectStructure) -> Self {
        let mut upstream: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut downstream: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for project in structure.projects() {
            upstream.entry(project.name.as_str()).or_default();
            downstream.entry(project.name.as_str()).or_default();
        }
        for project in structure.projects() {
            for dep in &project.dependencies {
                upstream
                    .entry(project.name.as_str())
                    .or_default()
                    .insert(dep.as_str());
                downstream
                    .entry(dep.as_str())
                    .or_default()
                    .insert(project.name.as_str());
            }
        }

        Self {
            upstream,
            downstream,
        }
    }

    pub fn len(&self) -> usize {
        self.upstream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty()
    }

    fn node(&self, name: &str) -> Result<()> {
        if self.upstream.contains_key(name) {
            Ok(())
        } else {
            Err(DeltaBuildError::ProjectNotFound {
                project: name.to_string(),
            })
        }
    }

    /// Direct dependencies of `name` (projects it depends on).
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<&'a str>> {
        self.node(name)?;
        Ok(self.upstream[name].iter().copied().collect())
    }

    /// Direct dependents of `name` (projects that depend on it).
    pub fn dependents_of(&self, name: &str) -> Result<Vec<&'a str>> {
        self.node(name)?;
        Ok(self.downstream[name].iter().copied().collect())
    }

    /// All transitive dependents of `name`, excluding `name` itself unless
    /// it sits on a cycle.
    pub fn transitive_dependents_of(&self, name: &str) -> Result<BTreeSet<&'a str>> {
        self.node(name)?;
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.downstream.get(current) {
                for &dep in dependents {
                    if visited.insert(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }

        Ok(visited)
    }

    /// Seeds plus everything that transitively depends on any seed.
    ///
    /// Each project is enqueued at most once, so diamonds cost nothing extra
    /// and cycles terminate. Seeds not in the graph are ignored.
    pub fn dependents_closure<'s>(
        &self,
        seeds: impl IntoIterator<Item = &'s str>,
    ) -> BTreeSet<&'a str> {
        let mut visited: BTreeSet<&'a str> = BTreeSet::new();
        let mut queue: VecDeque<&'a str> = VecDeque::new();

        for seed in seeds {
            if let Some((&name, _)) = self.downstream.get_key_value(seed) {
                if visited.insert(name) {
                    queue.push_back(name);
                }
            }
        }

        while let Some(current) = queue.pop_front() {
            for &dep in &self.downstream[current] {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        visited
    }

    /// Every dependency cycle reachable by DFS, each as a path that starts
    /// and ends with the same project. Empty for an acyclic graph.
    ///
    /// The walk keeps its own stack, so chain depth is bounded by memory
    /// rather than by the thread stack.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut state: BTreeMap<&str, Visit> = BTreeMap::new();
        let mut cycles = Vec::new();

        for &root in self.upstream.keys() {
            if state.contains_key(root) {
                continue;
            }

            // `path[i]` is the project whose remaining dependencies are `stack[i]`.
            let mut path: Vec<&'a str> = vec![root];
            let mut stack = vec![self.upstream[root].iter()];
            state.insert(root, Visit::InProgress);

            while let Some(deps) = stack.last_mut() {
                match deps.next() {
                    Some(&dep) => match state.get(dep) {
                        Some(Visit::InProgress) => {
                            let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|n| n.to_string()).collect();
                            cycle.push(dep.to_string());
                            cycles.push(cycle);
                        }
                        Some(Visit::Done) => {}
                        None => {
                            state.insert(dep, Visit::InProgress);
                            path.push(dep);
                            stack.push(self.upstream[dep].iter());
                        }
                    },
                    None => {
                        stack.pop();
                        if let Some(done) = path.pop() {
                            state.insert(done, Visit::Done);
                        }
                    }
                }
            }
        }
        cycles
    }

    /// Projects in build order: dependencies before dependents, ties broken
    /// by name. Uses Kahn's algorithm; fails on cycles.
    pub fn topological_order(&self) -> Result<Vec<&'a str>> {
        let mut pending: BTreeMap<&str, usize> = self
            .upstream
            .iter()
            .map(|(&name, deps)| (name, deps.len()))
            .collect();

        let mut queue: VecDeque<&'a str> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut sorted = Vec::with_capacity(self.len());
        while let Some(name) = queue.pop_front() {
            sorted.push(name);
            let mut next = Vec::new();
            for &dep in &self.downstream[name] {
                let count = pending.get_mut(dep).map(|c| {
                    *c -= 1;
                    *c
                });
                if count == Some(0) {
                    next.push(dep);
                }
            }
            next.sort_unstable();
            queue.extend(next);
        }

        if sorted.len() != self.len() {
            let emitted: BTreeSet<&str> = sorted.iter().copied().collect();
            return Err(DeltaBuildError::DependencyCycle {
                projects: self
                    .upstream
                    .keys()
                    .filter(|name| !emitted.contains(*name))
                    .map(|name| name.to_string())
                    .collect(),
            });
        }

        Ok(sorted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}
