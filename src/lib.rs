//! # lockdep
//!
//! A runtime lock-order deadlock detector.
//!
//! lockdep wraps mutual-exclusion primitives and records, for every thread,
//! which locks it currently holds. Each time a thread acquires a lock while
//! holding others, an "acquired-before" edge is recorded. An acquisition that
//! would close a cycle in that graph is a potential deadlock and is reported,
//! even on a run where the interleaving that hangs never happens.
//!
//! ## Features
//!
//! - Lock-order cycle detection before the real lock is taken
//! - A drop-in tracked [`Mutex`] built on `parking_lot`
//! - Generic [`acquire`]/[`release`] for any [`RawLock`] primitive
//! - Diagnostic snapshots of held locks and recorded dependencies
//! - Optional call-stack capture per dependency edge
//! - JSON-lines event log
//! - C ABI over `pthread_mutex_t` (unix)
//!
//! ## Example
//!
//! ```rust
//! use lockdep::{Lockdep, Mutex};
//!
//! let detector = Lockdep::new().print_reports(false).build().unwrap();
//! let a = Mutex::with_detector(1, detector.clone());
//! let b = Mutex::with_detector(2, detector.clone());
//!
//! {
//!     let _a = a.lock();
//!     let _b = b.lock();
//! }
//! {
//!     let _b = b.lock();
//!     let _a = a.lock(); // opposite order: reported
//! }
//!
//! assert!(detector.is_deadlock_detected());
//! ```

mod core;
pub use core::{
    DeadlockCallback, DeadlockInfo, Detector, DetectorConfig, DiagnosticReport, EdgeRecord,
    HeldLock, Lockdep, Mutex, MutexGuard, RawLock, ReportPolicy, TrackError, global_detector,
    logger::{EventLogger, LogEntry},
    registry::{DEFAULT_MAX_LOCKS, DEFAULT_MAX_THREADS},
    types::{Events, LockHandle, LockIndex, ThreadHandle, ThreadIndex, lock_handle_of},
};

#[cfg(unix)]
pub mod ffi;

/// Acquire `lock` through the process-wide detector
///
/// # Returns
/// Whatever the underlying primitive returns
pub fn acquire<L: RawLock + ?Sized>(lock: &L) -> Result<(), L::Error> {
    global_detector().acquire(lock)
}

/// Release `lock` through the process-wide detector
///
/// # Safety
/// The calling thread must hold `lock`.
pub unsafe fn release<L: RawLock + ?Sized>(lock: &L) -> Result<(), L::Error> {
    unsafe { global_detector().release(lock) }
}
