//! Logging functionality
//!
//! An optional JSON-lines log of lock attempts, acquisitions, releases, new
//! dependency edges and reported cycles, for postmortem inspection.

mod event_logger;

pub use event_logger::{EventLogger, LogEntry};
