//! Solution-wide restore input (`DependencyGraphSpec`)

use crate::spec::PackageSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use thiserror::Error;

pub const GRAPH_SPEC_FORMAT: u32 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum GraphSpecError {
    #[error("Circular project reference detected: {0}")]
    CircularReference(String),

    #[error("Project '{0}' is not part of the graph")]
    UnknownProject(String),
}

pub type GraphSpecResult<T> = Result<T, GraphSpecError>;

/// A project reference whose target is not in `projects`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MissingReference {
    pub from: String,
    pub to: String,
}

/// Every project reachable from a root through project references
#[derive(Debug, Clone)]
pub struct ProjectClosure<'a> {
    /// Root first, then breadth-first discovery order
    pub projects: Vec<&'a PackageSpec>,
    pub missing: Vec<MissingReference>,
}

impl ProjectClosure<'_> {
    pub fn contains(&self, unique_name: &str) -> bool {
        self.projects.iter().any(|p| p.unique_name() == unique_name)
    }
}

/// All project specs known to one restore operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraphSpec {
    #[serde(default = "default_format")]
    pub format: u32,

    /// Unique names of the projects to restore, in request order
    #[serde(default)]
    pub restore: Vec<String>,

    /// Every known spec keyed by unique name, including out-of-session projects
    #[serde(default)]
    pub projects: BTreeMap<String, PackageSpec>,
}

fn default_format() -> u32 {
    GRAPH_SPEC_FORMAT
}

impl Default for DependencyGraphSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraphSpec {
    pub fn new() -> Self {
        Self {
            format: GRAPH_SPEC_FORMAT,
            restore: Vec::new(),
            projects: BTreeMap::new(),
        }
    }

    /// Add or replace a project spec
    pub fn add_project(&mut self, spec: PackageSpec) {
        self.projects.insert(spec.unique_name().to_string(), spec);
    }

    /// Mark a project for restore; repeated calls are ignored
    pub fn add_restore(&mut self, unique_name: impl Into<String>) {
        let unique_name = unique_name.into();
        if !self.restore.contains(&unique_name) {
            self.restore.push(unique_name);
        }
    }

    pub fn project(&self, unique_name: &str) -> Option<&PackageSpec> {
        self.projects.get(unique_name)
    }

    /// Look a reference up by unique name, then by project name (case-insensitive)
    pub fn resolve_reference(&self, reference: &str) -> Option<&PackageSpec> {
        self.projects.get(reference).or_else(|| {
            self.projects
                .values()
                .find(|p| p.name.eq_ignore_ascii_case(reference))
        })
    }

    /// Breadth-first project closure of `unique_name`, across every framework
    pub fn closure(&self, unique_name: &str) -> GraphSpecResult<ProjectClosure<'_>> {
        let root = self
            .project(unique_name)
            .ok_or_else(|| GraphSpecError::UnknownProject(unique_name.to_string()))?;

        let mut projects = vec![root];
        let mut missing = BTreeSet::new();
        let mut seen = HashSet::from([root.unique_name().to_string()]);
        let mut queue = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            for reference in current.referenced_projects() {
                match self.resolve_reference(&reference) {
                    Some(spec) => {
                        if seen.insert(spec.unique_name().to_string()) {
                            projects.push(spec);
                            queue.push_back(spec);
                        }
                    }
                    None => {
                        missing.insert(MissingReference {
                            from: current.unique_name().to_string(),
                            to: reference,
                        });
                    }
                }
            }
        }

        Ok(ProjectClosure {
            projects,
            missing: missing.into_iter().collect(),
        })
    }

    /// Topological order over every known project: referenced projects
    /// come first, ties broken by unique name (Kahn's algorithm)
    pub fn restore_order(&self) -> GraphSpecResult<Vec<String>> {
        // Edges only count references that resolve inside the graph
        let mut dependencies: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (name, spec) in &self.projects {
            let deps = spec
                .referenced_projects()
                .iter()
                .filter_map(|r| self.resolve_reference(r))
                .map(|p| p.unique_name())
                .collect();
            dependencies.insert(name.as_str(), deps);
        }

        let mut in_degree: BTreeMap<&str, usize> = dependencies
            .iter()
            .map(|(name, deps)| (*name, deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.projects.len());

        while let Some(next) = ready.pop_first() {
            order.push(next.to_string());

            for (dependent, deps) in &dependencies {
                if deps.contains(next) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*dependent);
                        }
                    }
                }
            }
        }

        if order.len() != self.projects.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(name, _)| *name)
                .collect();
            return Err(GraphSpecError::CircularReference(stuck.join(", ")));
        }

        Ok(order)
    }

    /// Fails on any reference cycle among known projects, a project
    /// referencing itself included
    pub fn ensure_acyclic(&self) -> GraphSpecResult<()> {
        self.restore_order().map(|_| ())
    }

    /// A graph spec restoring only `unique_name` but carrying its whole closure
    pub fn with_project_closure(&self, unique_name: &str) -> GraphSpecResult<Self> {
        let closure = self.closure(unique_name)?;
        let mut graph = Self::new();
        graph.add_restore(unique_name);
        for spec in closure.projects {
            graph.add_project(spec.clone());
        }
        Ok(graph)
    }

    /// Deterministic JSON used for fingerprinting
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
