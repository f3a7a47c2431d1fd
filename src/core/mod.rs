// Core types
pub mod error;
pub mod types;
pub use error::TrackError;
pub use types::*;

// Bookkeeping tables
pub mod graph;
pub mod held;
pub mod registry;

// Logging functionality
pub mod logger;

// Deadlock detector
pub mod detector;
pub use detector::report::{DiagnosticReport, EdgeRecord, HeldLock};
pub use detector::{DeadlockCallback, Detector, DetectorConfig, ReportPolicy, global_detector};

// Instrumented locks
pub mod locks;
pub use locks::RawLock;
pub use locks::mutex::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use logger::EventLogger;
use std::sync::Arc;

/// Lockdep configuration builder
pub struct Lockdep {
    log_path: Option<String>,
    callback: Option<DeadlockCallback>,
    config: DetectorConfig,
}

impl Default for Lockdep {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockdep {
    /// Create a new builder with default settings
    ///
    /// By default:
    /// - Logging is disabled
    /// - No callback is set; reports are printed to stdout
    /// - Only the first detected cycle is reported
    /// - Call stacks are not captured
    /// - At most 30 locks and 40 threads are tracked
    pub fn new() -> Self {
        Lockdep {
            log_path: None,
            callback: None,
            config: DetectorConfig::default(),
        }
    }

    /// Activate the event log and set the path for the log file
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the path contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    pub fn with_log<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Set a callback to be invoked with every reported deadlock
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(DeadlockInfo) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Attach a captured call stack to every new dependency edge
    pub fn capture_call_stacks(mut self, enabled: bool) -> Self {
        self.config.capture_call_stacks = enabled;
        self
    }

    pub fn max_locks(mut self, max_locks: usize) -> Self {
        self.config.max_locks = max_locks;
        self
    }

    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.config.max_threads = max_threads;
        self
    }

    pub fn report_policy(mut self, policy: ReportPolicy) -> Self {
        self.config.report_policy = policy;
        self
    }

    /// Print reports to stdout (on by default)
    pub fn print_reports(mut self, enabled: bool) -> Self {
        self.config.print_reports = enabled;
        self
    }

    /// Build a standalone detector with these settings
    ///
    /// # Errors
    /// Returns an error if the event log cannot be opened
    pub fn build(self) -> Result<Arc<Detector>> {
        let logger = self.open_logger()?;
        let detector = Arc::new(Detector::new(self.config.clone()));
        self.install(&detector, logger);
        Ok(detector)
    }

    /// Configure the process-wide detector with these settings
    ///
    /// Nothing is changed if the event log cannot be opened.
    ///
    /// # Errors
    /// Returns an error if the event log cannot be opened
    pub fn start(self) -> Result<()> {
        let logger = self.open_logger()?;
        let detector = global_detector();
        detector.configure(self.config.clone());
        self.install(&detector, logger);
        Ok(())
    }

    fn open_logger(&self) -> Result<Option<EventLogger>> {
        self.log_path
            .as_deref()
            .map(|path| EventLogger::with_file(path).context("Failed to initialize logger"))
            .transpose()
    }

    fn install(self, detector: &Detector, logger: Option<EventLogger>) {
        if let Some(logger) = logger {
            detector.set_logger(logger);
        }
        if let Some(callback) = self.callback {
            detector.set_deadlock_callback(move |info| callback(info));
        }
    }
}
