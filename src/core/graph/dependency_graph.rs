//! Lock dependency graph
//!
//! When a thread holds lock A and then acquires lock B, we record the edge
//! A -> B. If a later attempt would add B -> A (or any edge closing a path back
//! to its source), the lock order is inconsistent and two threads can deadlock
//! even if this particular run never blocks.
//!
//! Edges are never removed. Once a pair of locks has been observed in both
//! orders the hazard is remembered for the rest of the process.

use crate::core::types::{LockIndex, ThreadIndex};
use fxhash::{FxHashMap, FxHashSet};
use std::backtrace::Backtrace;
use std::sync::Arc;

/// Provenance of a recorded dependency edge
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// Thread that created the edge
    pub thread: ThreadIndex,
    /// Whether this edge closed a cycle when it was added
    pub deadlock: bool,
    /// Call stack of the acquisition that created the edge, if captured
    pub backtrace: Option<Arc<Backtrace>>,
}

/// Result of offering an edge to the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// `before == after`; self-edges are never recorded
    SelfEdge,
    /// The edge already existed and was not re-checked
    Existing,
    /// A new ordinary edge was recorded
    Added,
    /// A new edge was recorded and it closes the given cycle
    ///
    /// The cycle starts and ends at `before`: `[before, after, ..., before]`.
    Cycle(Vec<LockIndex>),
}

/// Directed "acquired-before" graph over lock indices
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: maps each lock to the locks acquired after it
    successors: FxHashMap<LockIndex, FxHashSet<LockIndex>>,
    /// Edge provenance keyed by `(before, after)`
    edges: FxHashMap<(LockIndex, LockIndex), DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `after` was acquired while `before` was held
    ///
    /// A new edge is checked for a path `after -> ... -> before` before it is
    /// inserted. The edge is inserted either way; if such a path exists the
    /// edge is flagged as a deadlock edge and the closed cycle is returned.
    ///
    /// `backtrace` is only called when a new edge is actually created.
    pub fn add_edge<F>(
        &mut self,
        before: LockIndex,
        after: LockIndex,
        thread: ThreadIndex,
        backtrace: F,
    ) -> EdgeOutcome
    where
        F: FnOnce() -> Option<Arc<Backtrace>>,
    {
        if before == after {
            return EdgeOutcome::SelfEdge;
        }
        if self.edges.contains_key(&(before, after)) {
            return EdgeOutcome::Existing;
        }

        let cycle = self.find_path(after, before).map(|path| {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(before);
            cycle.extend(path);
            cycle
        });

        self.successors.entry(before).or_default().insert(after);
        self.edges.insert(
            (before, after),
            DependencyEdge {
                thread,
                deadlock: cycle.is_some(),
                backtrace: backtrace(),
            },
        );

        match cycle {
            Some(cycle) => EdgeOutcome::Cycle(cycle),
            None => EdgeOutcome::Added,
        }
    }

    /// Find a path from `start` to `end` with an iterative depth-first search
    ///
    /// The visited set keeps the search finite once the graph holds a cycle.
    ///
    /// # Returns
    /// The path including both endpoints, or `None` if `end` is unreachable
    pub fn find_path(&self, start: LockIndex, end: LockIndex) -> Option<Vec<LockIndex>> {
        if start == end {
            return Some(vec![start]);
        }
        if !self.successors.contains_key(&start) {
            return None;
        }

        let mut stack = vec![start];
        let mut visited = FxHashSet::default();
        let mut parent: FxHashMap<LockIndex, LockIndex> = FxHashMap::default();
        visited.insert(start);

        while let Some(current) = stack.pop() {
            let Some(neighbors) = self.successors.get(&current) else {
                continue;
            };
            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                parent.insert(neighbor, current);

                if neighbor == end {
                    let mut path = vec![end];
                    let mut node = end;
                    while let Some(&prev) = parent.get(&node) {
                        path.push(prev);
                        node = prev;
                    }
                    path.reverse();
                    return Some(path);
                }

                stack.push(neighbor);
            }
        }

        None
    }

    pub fn has_edge(&self, before: LockIndex, after: LockIndex) -> bool {
        self.edges.contains_key(&(before, after))
    }

    #[cfg(test)]
    fn edge(&self, before: LockIndex, after: LockIndex) -> Option<&DependencyEdge> {
        self.edges.get(&(before, after))
    }

    /// All edges ordered by `(before, after)`
    pub fn edges(&self) -> Vec<((LockIndex, LockIndex), &DependencyEdge)> {
        let mut edges: Vec<_> = self.edges.iter().map(|(&k, v)| (k, v)).collect();
        edges.sort_unstable_by_key(|&(key, _)| key);
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
