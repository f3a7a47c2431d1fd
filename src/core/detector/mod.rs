pub mod lock;
pub mod report;

use crate::core::graph::DependencyGraph;
use crate::core::held::HeldLockTable;
use crate::core::logger::EventLogger;
use crate::core::registry::{DEFAULT_MAX_LOCKS, DEFAULT_MAX_THREADS, Registry};
use crate::core::types::{
    DeadlockInfo, LockHandle, LockIndex, ThreadHandle, ThreadIndex, current_thread_handle,
};
use anyhow::Result;
use parking_lot::Mutex;
use report::DiagnosticReport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Function invoked with every reported deadlock
pub type DeadlockCallback = Arc<dyn Fn(DeadlockInfo) + Send + Sync>;

/// Which detected cycles produce a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportPolicy {
    /// Report only the first cycle the detector ever sees
    ///
    /// Later cycles are still recorded in the graph with their deadlock flag
    /// set, they just do not produce another report.
    #[default]
    FirstOnly,
    /// Report every newly recorded edge that closes a cycle
    EveryCycle,
}

/// Configuration for a deadlock detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Capture a backtrace for every new dependency edge
    pub capture_call_stacks: bool,
    /// Maximum number of distinct locks tracked
    pub max_locks: usize,
    /// Maximum number of distinct threads tracked
    pub max_threads: usize,
    /// Which cycles are reported
    pub report_policy: ReportPolicy,
    /// Print reports to stdout
    pub print_reports: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            capture_call_stacks: false,
            max_locks: DEFAULT_MAX_LOCKS,
            max_threads: DEFAULT_MAX_THREADS,
            report_policy: ReportPolicy::FirstOnly,
            print_reports: true,
        }
    }
}

/// Bookkeeping guarded by the meta-lock
pub(crate) struct State {
    pub(crate) registry: Registry,
    pub(crate) held: HeldLockTable,
    pub(crate) graph: DependencyGraph,
    pub(crate) config: DetectorConfig,
    pub(crate) callback: Option<DeadlockCallback>,
    pub(crate) logger: Option<EventLogger>,
}

/// Lock-order deadlock detector
///
/// The detector tracks which locks every thread holds and records an edge
/// A -> B whenever a thread acquires B while holding A. An acquisition that
/// would add an edge closing a cycle is a potential deadlock, even if this
/// run never blocks on it.
///
/// # How it works
///
/// 1. On an acquire attempt, the thread and lock are resolved to dense indices
/// 2. For every lock the thread already holds, the edge held -> new is offered
///    to the dependency graph
/// 3. A new edge is checked for a path back to its source before insertion
/// 4. A cycle flips the "deadlock observed" latch and produces a report
/// 5. The real lock is then acquired outside the meta-lock, and marked held
///    once the primitive reports success
///
/// All bookkeeping runs under a single meta-lock that is never held while a
/// caller blocks on one of its own locks.
pub struct Detector {
    state: Mutex<State>,
    detected: AtomicBool,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl Detector {
    /// Create a new detector with no callback and no event log
    pub fn new(config: DetectorConfig) -> Self {
        Detector {
            state: Mutex::new(State {
                registry: Registry::new(config.max_locks, config.max_threads),
                held: HeldLockTable::new(),
                graph: DependencyGraph::new(),
                config,
                callback: None,
                logger: None,
            }),
            detected: AtomicBool::new(false),
        }
    }

    /// Replace the configuration
    ///
    /// Capacity changes only affect identities seen from now on.
    pub fn configure(&self, config: DetectorConfig) {
        let mut state = self.state.lock();
        state
            .registry
            .set_capacity(config.max_locks, config.max_threads);
        state.config = config;
    }

    pub fn config(&self) -> DetectorConfig {
        self.state.lock().config.clone()
    }

    /// Set callback to be invoked when a deadlock is reported
    ///
    /// The callback runs on the thread that attempted the acquisition, after
    /// the meta-lock has been released and before the real lock is taken.
    pub fn set_deadlock_callback<F>(&self, callback: F)
    where
        F: Fn(DeadlockInfo) + Send + Sync + 'static,
    {
        self.state.lock().callback = Some(Arc::new(callback));
    }

    /// Attach an event logger
    pub fn set_logger(&self, logger: EventLogger) {
        self.state.lock().logger = Some(logger);
    }

    /// Flush the event log, if one is attached
    ///
    /// # Errors
    /// Returns an error if the logger thread does not acknowledge the flush
    pub fn flush_logs(&self) -> Result<()> {
        let logger = self.state.lock().logger.clone();
        match logger {
            Some(logger) => logger.flush(),
            None => Ok(()),
        }
    }

    /// Whether any cycle has been detected so far
    pub fn is_deadlock_detected(&self) -> bool {
        self.detected.load(Ordering::SeqCst)
    }

    /// Snapshot of held locks and dependency edges
    pub fn report(&self) -> DiagnosticReport {
        let state = self.state.lock();
        DiagnosticReport::capture(&state)
    }

    /// Index assigned to a lock handle, if it has been seen
    pub fn lock_index(&self, handle: LockHandle) -> Option<LockIndex> {
        self.state.lock().registry.lookup_lock(handle)
    }

    /// Index assigned to the calling thread, if it has been seen
    pub fn current_thread_index(&self) -> Option<ThreadIndex> {
        self.state
            .lock()
            .registry
            .lookup_thread(current_thread_handle())
    }

    /// Thread behind an index that appears in a report
    pub fn thread_handle(&self, index: ThreadIndex) -> Option<ThreadHandle> {
        self.state.lock().registry.thread_handle(index).ok()
    }

    /// Whether the calling thread holds the lock with this handle
    pub fn is_held(&self, handle: LockHandle) -> bool {
        let state = self.state.lock();
        let thread = state.registry.lookup_thread(current_thread_handle());
        let lock = state.registry.lookup_lock(handle);
        match (thread, lock) {
            (Some(thread), Some(lock)) => state.held.is_held(thread, lock),
            _ => false,
        }
    }

    /// Whether the edge `before -> after` has been recorded
    pub fn has_edge(&self, before: LockIndex, after: LockIndex) -> bool {
        self.state.lock().graph.has_edge(before, after)
    }

    pub fn edge_count(&self) -> usize {
        self.state.lock().graph.edge_count()
    }
}

// Global detector instance, created on first use
lazy_static::lazy_static! {
    static ref GLOBAL_DETECTOR: Arc<Detector> = Arc::new(Detector::default());
}

/// The process-wide detector used by [`crate::Mutex::new`], [`crate::acquire`]
/// and [`crate::release`]
pub fn global_detector() -> Arc<Detector> {
    Arc::clone(&GLOBAL_DETECTOR)
}
