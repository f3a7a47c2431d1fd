use crate::core::types::{LockIndex, ThreadIndex};
use thiserror::Error;

/// Failures internal to the detector's bookkeeping
///
/// None of these ever reach a caller of the lock facade: the facade absorbs
/// them and keeps delegating to the real primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackError {
    /// The registry is full, the identity is not tracked
    #[error("identity table is full ({capacity} entries)")]
    CapacityExhausted { capacity: usize },

    /// The thread index was never handed out by the registry
    #[error("unknown thread index {0}")]
    UnknownThread(ThreadIndex),

    /// The lock index was never handed out by the registry
    #[error("unknown lock index {0}")]
    UnknownLock(LockIndex),
}
