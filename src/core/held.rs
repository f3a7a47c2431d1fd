use crate::core::types::{LockIndex, ThreadIndex};
use fxhash::{FxHashMap, FxHashSet};

/// Tracks, for each thread, which locks it currently holds
///
/// A thread's entry is a set: the order in which it took its locks lives in
/// the dependency graph, not here.
#[derive(Debug, Default)]
pub struct HeldLockTable {
    held: FxHashMap<ThreadIndex, FxHashSet<LockIndex>>,
}

impl HeldLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_held(&mut self, thread: ThreadIndex, lock: LockIndex) {
        self.held.entry(thread).or_default().insert(lock);
    }

    /// Remove the mark. Returns false if the lock was not marked held.
    pub fn clear_held(&mut self, thread: ThreadIndex, lock: LockIndex) -> bool {
        let Some(holds) = self.held.get_mut(&thread) else {
            return false;
        };
        let removed = holds.remove(&lock);
        if holds.is_empty() {
            self.held.remove(&thread);
        }
        removed
    }

    pub fn is_held(&self, thread: ThreadIndex, lock: LockIndex) -> bool {
        self.held
            .get(&thread)
            .is_some_and(|holds| holds.contains(&lock))
    }

    /// Locks held by `thread`, in ascending index order
    pub fn held_locks_of(&self, thread: ThreadIndex) -> Vec<LockIndex> {
        let mut locks: Vec<LockIndex> = self
            .held
            .get(&thread)
            .map(|holds| holds.iter().copied().collect())
            .unwrap_or_default();
        locks.sort_unstable();
        locks
    }

    /// Every held `(thread, lock)` pair, sorted
    pub fn iter(&self) -> Vec<(ThreadIndex, LockIndex)> {
        let mut pairs: Vec<_> = self
            .held
            .iter()
            .flat_map(|(&t, holds)| holds.iter().map(move |&l| (t, l)))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}
