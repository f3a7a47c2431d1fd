use crate::core::detector::report::DiagnosticReport;
use crate::core::detector::{DeadlockCallback, Detector, ReportPolicy, State};
use crate::core::error::TrackError;
use crate::core::graph::EdgeOutcome;
use crate::core::locks::RawLock;
use crate::core::types::{
    DeadlockInfo, Events, LockHandle, LockIndex, ThreadHandle, ThreadIndex,
    current_thread_handle,
};
use chrono::Utc;
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// A cycle closed by a single acquisition attempt
struct Hazard {
    before: LockIndex,
    after: LockIndex,
    cycle: Vec<LockIndex>,
}

/// Everything needed to emit a report once the meta-lock is released
struct PendingReport {
    info: DeadlockInfo,
    print: bool,
    callback: Option<DeadlockCallback>,
}

impl State {
    fn resolve(
        &mut self,
        thread: ThreadHandle,
        lock: LockHandle,
    ) -> Result<(ThreadIndex, LockIndex), TrackError> {
        let thread = self.registry.resolve_thread(thread)?;
        let lock = self.registry.resolve_lock(lock)?;
        Ok((thread, lock))
    }

    fn lookup(&self, thread: ThreadHandle, lock: LockHandle) -> Option<(ThreadIndex, LockIndex)> {
        Some((
            self.registry.lookup_thread(thread)?,
            self.registry.lookup_lock(lock)?,
        ))
    }

    /// Offer `held -> lock` for every lock `thread` holds
    ///
    /// Held locks are visited in ascending index order and the scan stops at
    /// the first edge that closes a cycle.
    fn check_and_record(&mut self, thread: ThreadIndex, lock: LockIndex) -> Option<Hazard> {
        let capture = self.config.capture_call_stacks;
        // One backtrace is shared by all edges created in this attempt
        let mut stack: Option<Arc<Backtrace>> = None;

        for held in self.held.held_locks_of(thread) {
            let outcome = self.graph.add_edge(held, lock, thread, || {
                capture.then(|| {
                    Arc::clone(stack.get_or_insert_with(|| Arc::new(Backtrace::force_capture())))
                })
            });

            match outcome {
                EdgeOutcome::Cycle(cycle) => {
                    return Some(Hazard {
                        before: held,
                        after: lock,
                        cycle,
                    });
                }
                EdgeOutcome::Added => {
                    if let Some(logger) = &self.logger {
                        logger.log_edge(thread, held, lock);
                    }
                }
                EdgeOutcome::SelfEdge | EdgeOutcome::Existing => {}
            }
        }
        None
    }
}

impl Detector {
    /// Register a lock attempt by the calling thread
    ///
    /// Runs the cycle check under the meta-lock and emits a report after
    /// releasing it.
    ///
    /// # Returns
    /// The resolved indices, or `None` if the thread or lock is not tracked
    fn on_lock_attempt(
        &self,
        thread: ThreadHandle,
        lock: LockHandle,
    ) -> Option<(ThreadIndex, LockIndex)> {
        let (ids, pending) = {
            let mut state = self.state.lock();
            let (thread, lock) = state.resolve(thread, lock).ok()?;

            if let Some(logger) = &state.logger {
                logger.log_interaction_event(thread, lock, Events::Attempt);
            }

            let pending = state
                .check_and_record(thread, lock)
                .and_then(|hazard| self.on_hazard(&state, thread, hazard));

            ((thread, lock), pending)
        };

        if let Some(pending) = pending {
            emit_report(pending);
        }
        Some(ids)
    }

    /// Latch detection state and decide whether `hazard` is reported
    fn on_hazard(
        &self,
        state: &State,
        thread: ThreadIndex,
        hazard: Hazard,
    ) -> Option<PendingReport> {
        let first = !self.detected.swap(true, Ordering::SeqCst);
        let report = match state.config.report_policy {
            ReportPolicy::FirstOnly => first,
            ReportPolicy::EveryCycle => true,
        };
        if !report {
            // Still recorded in the log, without a snapshot
            if let Some(logger) = &state.logger {
                logger.log_cycle_edge(thread, hazard.before, hazard.after);
            }
            return None;
        }

        let info = DeadlockInfo {
            thread,
            before: hazard.before,
            after: hazard.after,
            before_handle: state.registry.lock_handle(hazard.before).unwrap_or_default(),
            after_handle: state.registry.lock_handle(hazard.after).unwrap_or_default(),
            lock_cycle: hazard.cycle,
            timestamp: Utc::now().to_rfc3339(),
            report: DiagnosticReport::capture(state),
        };

        if let Some(logger) = &state.logger {
            logger.log_deadlock(&info);
        }

        Some(PendingReport {
            info,
            print: state.config.print_reports,
            callback: state.callback.clone(),
        })
    }

    /// Register a successful acquisition
    fn on_lock_acquired(&self, thread: ThreadIndex, lock: LockIndex) {
        let mut state = self.state.lock();
        state.held.mark_held(thread, lock);
        if let Some(logger) = &state.logger {
            logger.log_interaction_event(thread, lock, Events::Acquired);
        }
    }

    /// Register a successful release
    fn on_lock_release(&self, thread: ThreadHandle, lock: LockHandle) {
        let mut state = self.state.lock();
        // Identities never resolved cannot be held
        let Some((thread, lock)) = state.lookup(thread, lock) else {
            return;
        };
        state.held.clear_held(thread, lock);
        if let Some(logger) = &state.logger {
            logger.log_interaction_event(thread, lock, Events::Released);
        }
    }

    /// Acquire `lock`, checking the acquisition against the lock order seen so far
    ///
    /// The cycle check runs before the real acquire and never blocks on the
    /// caller's lock. The lock is marked held only if the primitive succeeds.
    /// Identities beyond the registry's capacity are passed straight through.
    ///
    /// # Returns
    /// Whatever the underlying primitive returns
    pub fn acquire<L: RawLock + ?Sized>(&self, lock: &L) -> Result<(), L::Error> {
        let tracked = self.on_lock_attempt(current_thread_handle(), lock.handle());

        lock.raw_lock()?;

        if let Some((thread, lock)) = tracked {
            self.on_lock_acquired(thread, lock);
        }
        Ok(())
    }

    /// Try to acquire `lock` without blocking
    ///
    /// A non-blocking attempt cannot wait on another thread, so no dependency
    /// edges are recorded for it. If the lock is taken it is marked held, and
    /// later blocking acquisitions record edges from it as usual.
    ///
    /// # Returns
    /// `Ok(true)` if the lock was taken, `Ok(false)` if it was busy
    pub fn try_acquire<L: RawLock + ?Sized>(&self, lock: &L) -> Result<bool, L::Error> {
        if !lock.raw_try_lock()? {
            return Ok(false);
        }

        let mut state = self.state.lock();
        if let Ok((thread, lock)) = state.resolve(current_thread_handle(), lock.handle()) {
            state.held.mark_held(thread, lock);
            if let Some(logger) = &state.logger {
                logger.log_interaction_event(thread, lock, Events::Acquired);
            }
        }
        Ok(true)
    }

    /// Release `lock` and clear its held mark for the calling thread
    ///
    /// # Safety
    /// The calling thread must hold `lock`, as required by
    /// [`RawLock::raw_unlock`].
    pub unsafe fn release<L: RawLock + ?Sized>(&self, lock: &L) -> Result<(), L::Error> {
        unsafe { lock.raw_unlock()? };
        self.on_lock_release(current_thread_handle(), lock.handle());
        Ok(())
    }
}

fn emit_report(pending: PendingReport) {
    if pending.print {
        println!("{}", pending.info);
    }
    if let Some(callback) = pending.callback {
        callback(pending.info);
    }
}
