//! Dependency graph over workspace packages.
//!
//! Packages live in a flat arena sorted by name; a [`PackageId`] is an index
//! into it. Edges are resolved once at construction into forward
//! (package → its dependencies) and reverse (package → its dependents)
//! adjacency lists, so every query after that is index arithmetic.
//!
//! ```text
//!   packages: [api, cli, core]          ids 0, 1, 2 (name order)
//!   forward:  api → [core]              cli → [api, core]    core → []
//!   reverse:  api → [cli]               cli → []             core → [api, cli]
//! ```
//!
//! The graph is rejected at construction if it contains a cycle, and is
//! never mutated afterwards.

mod batches;
mod cycle;

pub use batches::Batches;

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};

use kumi_types::Package;
use thiserror::Error;

/// Structural errors in a package graph. All are fatal to the operation that
/// needed the graph: no execution order can be derived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("dependency cycle detected: {}", format_cycle(.members))]
    Cycle { members: Vec<String> },
    #[error("package '{package}' depends on unknown workspace package '{dependency}'")]
    UnresolvedDependency { package: String, dependency: String },
    #[error("duplicate package name: {0}")]
    DuplicatePackage(String),
    #[error("unknown package: {0}")]
    UnknownPackage(String),
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {}", members.join(" -> "), first),
        None => String::from("<empty>"),
    }
}

/// Index of a package inside one [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(u32);

impl PackageId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position in the graph's arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Resolved, acyclic dependency graph of a workspace.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Arena, sorted by name.
    packages: Vec<Package>,
    /// Name → arena index.
    index: HashMap<String, PackageId>,
    /// Direct dependencies, declaration order.
    forward: Vec<Vec<PackageId>>,
    /// Direct dependents, name order.
    reverse: Vec<Vec<PackageId>>,
}

impl DependencyGraph {
    /// Build a graph from the full package set of a workspace.
    ///
    /// Fails on duplicate names, on dependency names that match no package,
    /// and on cycles (including a package depending on itself).
    pub fn new<I>(packages: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Package>,
    {
        let graph = Self::resolve(packages)?;

        let roots: Vec<PackageId> = (0..graph.packages.len()).map(PackageId::new).collect();
        if let Some(cycle) = cycle::find_cycle(&graph.forward, &roots, |_| true) {
            let members = graph.names(&cycle);
            tracing::debug!(?members, "rejecting cyclic workspace graph");
            return Err(GraphError::Cycle { members });
        }

        tracing::debug!(packages = graph.packages.len(), "built dependency graph");
        Ok(graph)
    }

    /// Sort, index, and resolve edges without the acyclicity check.
    fn resolve<I>(packages: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Package>,
    {
        let mut packages: Vec<Package> = packages.into_iter().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pair) = packages.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(GraphError::DuplicatePackage(pair[0].name.clone()));
        }

        let index: HashMap<String, PackageId> = packages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), PackageId::new(i)))
            .collect();

        let mut forward = Vec::with_capacity(packages.len());
        for pkg in &packages {
            let mut deps: Vec<PackageId> = Vec::with_capacity(pkg.workspace_dependencies.len());
            for dep in &pkg.workspace_dependencies {
                let id = index.get(dep).copied().ok_or_else(|| GraphError::UnresolvedDependency {
                    package: pkg.name.clone(),
                    dependency: dep.clone(),
                })?;
                if !deps.contains(&id) {
                    deps.push(id);
                }
            }
            forward.push(deps);
        }

        // Walking sources in arena order keeps every dependents list name-sorted.
        let mut reverse = vec![Vec::new(); packages.len()];
        for (source, deps) in forward.iter().enumerate() {
            for dep in deps {
                reverse[dep.index()].push(PackageId::new(source));
            }
        }

        Ok(Self {
            packages,
            index,
            forward,
            reverse,
        })
    }

    /// Build a graph that may contain cycles, for exercising the scheduler's
    /// own cycle detection.
    #[cfg(test)]
    pub(crate) fn new_unchecked<I>(packages: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Package>,
    {
        Self::resolve(packages)
    }

    // --- Lookup ---

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All packages in name order.
    pub fn packages(&self) -> impl ExactSizeIterator<Item = &Package> + '_ {
        self.packages.iter()
    }

    /// Look up a package by name.
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.id(name).map(|id| &self.packages[id.index()])
    }

    /// True if a package with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Arena id for a package name.
    pub fn id(&self, name: &str) -> Option<PackageId> {
        self.index.get(name).copied()
    }

    /// Package for an id issued by this graph.
    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(id.index())
    }

    fn require(&self, name: &str) -> Result<PackageId, GraphError> {
        self.id(name)
            .ok_or_else(|| GraphError::UnknownPackage(name.to_string()))
    }

    fn resolve_all(&self, ids: &[PackageId]) -> Vec<&Package> {
        ids.iter().map(|id| &self.packages[id.index()]).collect()
    }

    fn names(&self, ids: &[PackageId]) -> Vec<String> {
        ids.iter()
            .map(|id| self.packages[id.index()].name.clone())
            .collect()
    }

    // --- Queries ---

    /// Direct dependencies of `name`, in declaration order.
    pub fn get_dependencies(&self, name: &str) -> Result<Vec<&Package>, GraphError> {
        let id = self.require(name)?;
        Ok(self.resolve_all(&self.forward[id.index()]))
    }

    /// Packages that declare a direct dependency on `name`, in name order.
    pub fn get_dependents(&self, name: &str) -> Result<Vec<&Package>, GraphError> {
        let id = self.require(name)?;
        Ok(self.resolve_all(&self.reverse[id.index()]))
    }

    /// Everything that depends on `name` directly or indirectly, excluding
    /// `name` itself, in name order.
    pub fn get_transitive_dependents(&self, name: &str) -> Result<Vec<&Package>, GraphError> {
        let id = self.require(name)?;
        Ok(self.reachable(&[id], &self.reverse, false))
    }

    /// Everything `name` depends on directly or indirectly, excluding `name`
    /// itself, in name order.
    pub fn get_transitive_dependencies(&self, name: &str) -> Result<Vec<&Package>, GraphError> {
        let id = self.require(name)?;
        Ok(self.reachable(&[id], &self.forward, false))
    }

    /// The changed packages plus all of their transitive dependents, in name
    /// order. This is the impact set of a change.
    pub fn affected<I>(&self, changed: I) -> Result<Vec<&Package>, GraphError>
    where
        I: IntoIterator,
        I::Item: Borrow<Package>,
    {
        let mut starts = Vec::new();
        for pkg in changed {
            starts.push(self.require(&pkg.borrow().name)?);
        }
        Ok(self.reachable(&starts, &self.reverse, true))
    }

    /// Breadth-first walk over `edges` from `starts`, deduplicated via a
    /// visited set.
    fn reachable(
        &self,
        starts: &[PackageId],
        edges: &[Vec<PackageId>],
        include_starts: bool,
    ) -> Vec<&Package> {
        let mut visited = vec![false; self.packages.len()];
        let mut queue: VecDeque<PackageId> = VecDeque::new();

        for &start in starts {
            if !visited[start.index()] {
                visited[start.index()] = true;
                queue.push_back(start);
            }
        }

        while let Some(id) = queue.pop_front() {
            for &next in &edges[id.index()] {
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    queue.push_back(next);
                }
            }
        }

        if !include_starts {
            for start in starts {
                visited[start.index()] = false;
            }
        }

        visited
            .iter()
            .enumerate()
            .filter(|(_, seen)| **seen)
            .map(|(i, _)| &self.packages[i])
            .collect()
    }

    // --- Scheduling ---

    /// Layered topological schedule over a subset of this graph.
    ///
    /// Every candidate must be a member of the graph; duplicates collapse.
    /// Edges to packages outside the subset are ignored.
    pub fn batches<I>(&self, candidates: I) -> Result<Batches<'_>, GraphError>
    where
        I: IntoIterator,
        I::Item: Borrow<Package>,
    {
        let mut ids = Vec::new();
        for pkg in candidates {
            ids.push(self.require(&pkg.borrow().name)?);
        }
        Ok(Batches::new(self, ids))
    }

    /// All packages, flattened in dependency order (dependencies first, ties
    /// by name).
    pub fn topological_order(&self) -> Vec<&Package> {
        let ids: Vec<PackageId> = (0..self.packages.len()).map(PackageId::new).collect();
        Batches::new(self, ids)
            .filter_map(Result::ok)
            .flatten()
            .collect()
    }

    pub(crate) fn forward_edges(&self) -> &[Vec<PackageId>] {
        &self.forward
    }

    pub(crate) fn reverse_edges(&self) -> &[Vec<PackageId>] {
        &self.reverse
    }

    pub(crate) fn package_at(&self, id: PackageId) -> &Package {
        &self.packages[id.index()]
    }
}
