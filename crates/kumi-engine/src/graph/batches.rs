//! Layered topological scheduling.
//!
//! Kahn's algorithm, one layer at a time. Each call to `next()` releases
//! every remaining candidate whose in-subset dependencies have all been
//! released by earlier layers:
//!
//! ```text
//!   candidates {core, api, cli, docs}
//!
//!   layer 0: [core, docs]    in-degree 0
//!   layer 1: [api]           core released
//!   layer 2: [cli]           api released
//! ```
//!
//! Layers are computed lazily: nothing past the current layer is touched
//! until the caller asks for it.

use std::collections::BTreeSet;

use kumi_types::Package;

use super::{DependencyGraph, GraphError, PackageId, cycle};

/// Lazy iterator over dependency layers of a package subset.
///
/// Yields `Ok(layer)` with packages sorted by name. If candidates remain but
/// none is ready, yields a single `Err(GraphError::Cycle)` and then ends.
#[derive(Debug, Clone)]
pub struct Batches<'g> {
    graph: &'g DependencyGraph,
    /// Candidate not yet released, by arena index.
    pending: Vec<bool>,
    /// Unreleased in-subset dependencies, by arena index.
    in_degree: Vec<usize>,
    /// Next layer, sorted.
    ready: Vec<PackageId>,
    remaining: usize,
    done: bool,
}

impl<'g> Batches<'g> {
    pub(super) fn new(graph: &'g DependencyGraph, candidates: Vec<PackageId>) -> Self {
        let n = graph.len();
        let mut pending = vec![false; n];
        let unique: BTreeSet<PackageId> = candidates.into_iter().collect();
        for id in &unique {
            pending[id.index()] = true;
        }

        let forward = graph.forward_edges();
        let mut in_degree = vec![0; n];
        for id in &unique {
            in_degree[id.index()] = forward[id.index()]
                .iter()
                .filter(|dep| pending[dep.index()])
                .count();
        }

        // BTreeSet iteration is ascending, i.e. name order.
        let ready = unique
            .iter()
            .copied()
            .filter(|id| in_degree[id.index()] == 0)
            .collect();

        Self {
            graph,
            pending,
            in_degree,
            ready,
            remaining: unique.len(),
            done: false,
        }
    }

    /// Drain every layer, stopping at the first error.
    pub fn collect_layers(self) -> Result<Vec<Vec<&'g Package>>, GraphError> {
        self.collect()
    }

    /// Candidates not yet released.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn cycle_error(&self) -> GraphError {
        let roots: Vec<PackageId> = (0..self.pending.len())
            .filter(|&i| self.pending[i])
            .map(PackageId::new)
            .collect();
        let ids = cycle::find_cycle(self.graph.forward_edges(), &roots, |id| {
            self.pending[id.index()]
        })
        .unwrap_or(roots);
        GraphError::Cycle {
            members: ids
                .iter()
                .map(|id| self.graph.package_at(*id).name.clone())
                .collect(),
        }
    }
}

impl<'g> Iterator for Batches<'g> {
    type Item = Result<Vec<&'g Package>, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            self.done = true;
            return None;
        }

        if self.ready.is_empty() {
            self.done = true;
            return Some(Err(self.cycle_error()));
        }

        let layer = std::mem::take(&mut self.ready);
        for id in &layer {
            self.pending[id.index()] = false;
        }
        self.remaining -= layer.len();

        let reverse = self.graph.reverse_edges();
        let mut next = Vec::new();
        for id in &layer {
            for &dependent in &reverse[id.index()] {
                if !self.pending[dependent.index()] {
                    continue;
                }
                let degree = &mut self.in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        self.ready = next;

        Some(Ok(layer
            .into_iter()
            .map(|id| self.graph.package_at(id))
            .collect()))
    }
}
