//! Identity registry
//!
//! Maps opaque lock and thread handles to small dense indices. Indices are
//! assigned in first-seen order and stay stable for the lifetime of the
//! registry; there is no unregister operation, so an index is never reused
//! even if the lock it names has been destroyed.

use crate::core::error::TrackError;
use crate::core::types::{LockHandle, LockIndex, ThreadHandle, ThreadIndex};
use fxhash::FxHashMap;
use std::hash::Hash;

/// Default bound on distinct locks, as in the C lockdep library
pub const DEFAULT_MAX_LOCKS: usize = 30;

/// Default bound on distinct threads, as in the C lockdep library
pub const DEFAULT_MAX_THREADS: usize = 40;

/// Bounded handle-to-index table
#[derive(Debug)]
pub struct IdentityTable<K> {
    indices: FxHashMap<K, usize>,
    handles: Vec<K>,
    capacity: usize,
}

impl<K: Copy + Eq + Hash> IdentityTable<K> {
    /// Create an empty table that tracks at most `capacity` handles
    pub fn with_capacity(capacity: usize) -> Self {
        IdentityTable {
            indices: FxHashMap::default(),
            handles: Vec::new(),
            capacity,
        }
    }

    /// Return the index of `handle`, assigning the next free one if unseen
    ///
    /// # Errors
    /// Returns [`TrackError::CapacityExhausted`] when `handle` is new and the
    /// table already holds `capacity` handles.
    pub fn resolve(&mut self, handle: K) -> Result<usize, TrackError> {
        if let Some(&index) = self.indices.get(&handle) {
            return Ok(index);
        }
        if self.handles.len() >= self.capacity {
            return Err(TrackError::CapacityExhausted {
                capacity: self.capacity,
            });
        }

        let index = self.handles.len();
        self.handles.push(handle);
        self.indices.insert(handle, index);
        Ok(index)
    }

    /// Look up an already assigned index without assigning a new one
    pub fn lookup(&self, handle: &K) -> Option<usize> {
        self.indices.get(handle).copied()
    }

    /// Reverse lookup from index to handle
    pub fn handle(&self, index: usize) -> Option<K> {
        self.handles.get(index).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.handles.len()
    }

    /// Change the bound. Already assigned indices are kept even if the new
    /// bound is smaller; only new handles are refused.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}

/// Lock and thread identity tables of one detector
#[derive(Debug)]
pub struct Registry {
    locks: IdentityTable<LockHandle>,
    threads: IdentityTable<ThreadHandle>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOCKS, DEFAULT_MAX_THREADS)
    }
}

impl Registry {
    pub fn new(max_locks: usize, max_threads: usize) -> Self {
        Registry {
            locks: IdentityTable::with_capacity(max_locks),
            threads: IdentityTable::with_capacity(max_threads),
        }
    }

    pub fn resolve_lock(&mut self, handle: LockHandle) -> Result<LockIndex, TrackError> {
        self.locks.resolve(handle)
    }

    pub fn resolve_thread(&mut self, handle: ThreadHandle) -> Result<ThreadIndex, TrackError> {
        self.threads.resolve(handle)
    }

    pub fn lookup_lock(&self, handle: LockHandle) -> Option<LockIndex> {
        self.locks.lookup(&handle)
    }

    pub fn lookup_thread(&self, handle: ThreadHandle) -> Option<ThreadIndex> {
        self.threads.lookup(&handle)
    }

    pub fn lock_handle(&self, index: LockIndex) -> Result<LockHandle, TrackError> {
        self.locks.handle(index).ok_or(TrackError::UnknownLock(index))
    }

    pub fn thread_handle(&self, index: ThreadIndex) -> Result<ThreadHandle, TrackError> {
        self.threads
            .handle(index)
            .ok_or(TrackError::UnknownThread(index))
    }

    pub fn set_capacity(&mut self, max_locks: usize, max_threads: usize) {
        self.locks.set_capacity(max_locks);
        self.threads.set_capacity(max_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_is_idempotent() {
        let mut table = IdentityTable::with_capacity(4);
        let first = table.resolve(0xdead_usize).unwrap();
        assert_eq!(table.resolve(0xdead).unwrap(), first);
        assert_eq!(table.resolve(0xdead).unwrap(), first);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_handles_get_dense_indices() {
        let mut table = IdentityTable::with_capacity(8);
        let indices: Vec<_> = (0..8usize)
            .map(|h| table.resolve(0x1000 + h * 8).unwrap())
            .collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(table.handle(3), Some(0x1000 + 3 * 8));
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut table = IdentityTable::with_capacity(2);
        assert_eq!(table.resolve(1usize), Ok(0));
        assert_eq!(table.resolve(2usize), Ok(1));
        assert_eq!(
            table.resolve(3usize),
            Err(TrackError::CapacityExhausted { capacity: 2 })
        );
        // Known handles still resolve after the table is full
        assert_eq!(table.resolve(1usize), Ok(0));
        assert_eq!(table.lookup(&3), None);
    }

    #[test]
    fn test_shrinking_capacity_keeps_existing_indices() {
        let mut table = IdentityTable::with_capacity(4);
        table.resolve(10usize).unwrap();
        table.resolve(20usize).unwrap();
        table.set_capacity(1);
        assert_eq!(table.resolve(20usize), Ok(1));
        assert!(table.resolve(30usize).is_err());
    }

    #[test]
    fn test_registry_threads_and_locks_are_independent() {
        let mut registry = Registry::new(2, 2);
        let here = thread::current().id();
        let there = thread::spawn(|| thread::current().id()).join().unwrap();

        assert_eq!(registry.resolve_thread(here), Ok(0));
        assert_eq!(registry.resolve_lock(0xa0), Ok(0));
        assert_eq!(registry.resolve_thread(there), Ok(1));
        assert_eq!(registry.thread_handle(1), Ok(there));
        assert_eq!(registry.lock_handle(5), Err(TrackError::UnknownLock(5)));
        assert_eq!(registry.thread_handle(2), Err(TrackError::UnknownThread(2)));
        assert_eq!(registry.locks.len(), 1);
    }
}
