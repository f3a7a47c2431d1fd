use crate::core::detector::report::DiagnosticReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense index assigned to a thread by the identity registry
///
/// Indices start at 0, are handed out in first-seen order and are never
/// reused for the lifetime of the detector.
pub type ThreadIndex = usize;

/// Dense index assigned to a lock by the identity registry
pub type LockIndex = usize;

/// Opaque identity of a caller-owned lock primitive
///
/// This is the address of the primitive. The detector only compares handles,
/// it never dereferences them.
pub type LockHandle = usize;

/// Opaque identity of a thread, as reported by the standard library
pub type ThreadHandle = std::thread::ThreadId;

/// Get the handle of the calling thread
pub fn current_thread_handle() -> ThreadHandle {
    std::thread::current().id()
}

/// Compute the handle for a lock primitive from its address
pub fn lock_handle_of<L: ?Sized>(lock: &L) -> LockHandle {
    lock as *const L as *const () as usize
}

/// Events recorded by the event logger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Events {
    /// Thread is attempting to acquire a lock
    Attempt,
    /// Thread successfully acquired a lock
    Acquired,
    /// Thread released a lock
    Released,
    /// A new dependency edge was recorded
    Edge,
    /// A dependency edge closed a cycle
    Deadlock,
}

/// Describes a lock-order cycle found by the detector
///
/// Delivered to the report sinks (stdout, event log, callback) when an
/// acquisition attempt would close a cycle in the dependency graph. The
/// snapshot in `report` was taken under the same meta-lock hold that recorded
/// the offending edge, so it always contains that edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockInfo {
    /// Thread whose acquisition attempt completed the cycle
    pub thread: ThreadIndex,

    /// Lock the thread was already holding
    pub before: LockIndex,

    /// Lock the thread was attempting to acquire
    pub after: LockIndex,

    /// Handle of `before`
    pub before_handle: LockHandle,

    /// Handle of `after`
    pub after_handle: LockHandle,

    /// The closed cycle as lock indices, starting and ending at `before`
    ///
    /// For the classic two-lock inversion with `before = 0` and `after = 1`
    /// this is `[0, 1, 0]`.
    pub lock_cycle: Vec<LockIndex>,

    /// ISO-8601 timestamp of the detection
    pub timestamp: String,

    /// Held locks and dependency edges at the moment of detection
    pub report: DiagnosticReport,
}

impl fmt::Display for DeadlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            ">>> lockdep: thread {} deadlock lock {:#x} (id={}) -> lock {:#x} (id={})",
            self.thread, self.before_handle, self.before, self.after_handle, self.after
        )?;
        let cycle: Vec<String> = self.lock_cycle.iter().map(|l| l.to_string()).collect();
        writeln!(f, "lock cycle: {}", cycle.join(" -> "))?;
        writeln!(f)?;
        write!(f, "{}", self.report)
    }
}
