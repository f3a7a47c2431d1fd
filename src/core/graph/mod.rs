//! Graph module for deadlock detection
//!
//! The dependency graph records, for every pair of locks, whether one was ever
//! acquired while the other was held.

pub(crate) mod dependency_graph;

pub use dependency_graph::{DependencyGraph, EdgeOutcome};
