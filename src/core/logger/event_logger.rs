//! Logger for recording lock operations and detected cycles
//!
//! Entries are serialized as JSON lines and written by a background thread, so
//! logging from inside the detector's meta-lock costs one channel send. The
//! writer batches entries and flushes whenever its queue drains, on an
//! explicit [`EventLogger::flush`] and when the last sender is dropped.

use crate::core::types::{DeadlockInfo, Events, LockIndex, ThreadIndex};
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// A single lock event
#[derive(Debug, Serialize, Clone)]
pub struct LogEntry {
    /// Thread that performed the action
    pub thread: ThreadIndex,
    /// Lock that was involved
    pub lock: LockIndex,
    /// Lock held while `lock` was acquired, for edge events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<LockIndex>,
    /// Type of event that occurred
    pub event: Events,
    /// Seconds since the Unix epoch, microsecond precision
    pub timestamp: f64,
}

/// Terminal record written when a cycle is reported
#[derive(Debug, Serialize)]
struct DeadlockRecord<'a> {
    event: Events,
    timestamp: f64,
    deadlock: &'a DeadlockInfo,
}

/// Commands for the writer thread
#[derive(Debug)]
enum LoggerCommand {
    /// Write a pre-serialized JSON line
    Line(String),
    /// Flush pending lines to disk and signal completion
    Flush(Sender<()>),
}

/// Event logger writing JSON lines to a file
#[derive(Debug, Clone)]
pub struct EventLogger {
    sender: Sender<LoggerCommand>,
    path: PathBuf,
}

impl EventLogger {
    /// Create a logger that writes to `path`, truncating it
    ///
    /// If the file name contains `{timestamp}` it is replaced with the current
    /// time as `YYYYmmdd_HHMMSS`. Missing parent directories are created.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The directory containing the log file could not be created
    /// - The log file could not be opened for writing
    /// - The writer thread could not be spawned
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_timestamp(path.as_ref());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        let (tx, rx) = unbounded::<LoggerCommand>();
        thread::Builder::new()
            .name("lockdep-logger".into())
            .spawn(move || writer_thread(file, rx))
            .context("Failed to spawn logger thread")?;

        Ok(EventLogger { sender: tx, path })
    }

    /// Path of the log file, after `{timestamp}` expansion
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log an attempt, acquisition or release
    pub fn log_interaction_event(&self, thread: ThreadIndex, lock: LockIndex, event: Events) {
        self.send_entry(LogEntry {
            thread,
            lock,
            before: None,
            event,
            timestamp: now(),
        });
    }

    /// Log a new ordinary dependency edge `before -> lock`
    pub fn log_edge(&self, thread: ThreadIndex, before: LockIndex, lock: LockIndex) {
        self.log_dependency(thread, before, lock, Events::Edge);
    }

    /// Log a new edge `before -> lock` that closes a cycle but is not reported
    ///
    /// Reported cycles are written by [`EventLogger::log_deadlock`] instead.
    pub fn log_cycle_edge(&self, thread: ThreadIndex, before: LockIndex, lock: LockIndex) {
        self.log_dependency(thread, before, lock, Events::Deadlock);
    }

    fn log_dependency(
        &self,
        thread: ThreadIndex,
        before: LockIndex,
        lock: LockIndex,
        event: Events,
    ) {
        self.send_entry(LogEntry {
            thread,
            lock,
            before: Some(before),
            event,
            timestamp: now(),
        });
    }

    /// Log a reported cycle, including its diagnostic snapshot
    pub fn log_deadlock(&self, info: &DeadlockInfo) {
        let record = DeadlockRecord {
            event: Events::Deadlock,
            timestamp: now(),
            deadlock: info,
        };
        if let Ok(json) = serde_json::to_string(&record) {
            let _ = self.sender.send(LoggerCommand::Line(json));
        }
    }

    /// Block until everything logged so far is on disk
    ///
    /// # Errors
    /// Returns an error if the writer thread has exited or does not answer
    /// within five seconds
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.sender
            .send(LoggerCommand::Flush(ack_tx))
            .map_err(|_| anyhow!("Logger thread has exited"))?;
        ack_rx
            .recv_timeout(FLUSH_TIMEOUT)
            .context("Timed out waiting for log flush")
    }

    fn send_entry(&self, entry: LogEntry) {
        // Logging must never fail the caller's lock operation
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = self.sender.send(LoggerCommand::Line(json));
        }
    }
}

fn now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0
}

fn expand_timestamp(path: &Path) -> PathBuf {
    #[allow(clippy::literal_string_with_formatting_args)]
    let placeholder = "{timestamp}";
    let raw = path.to_string_lossy();
    if raw.contains(placeholder) {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        PathBuf::from(raw.replace(placeholder, &timestamp))
    } else {
        path.to_path_buf()
    }
}

fn writer_thread(file: File, rx: Receiver<LoggerCommand>) {
    let mut writer = BufWriter::new(file);

    while let Ok(command) = rx.recv() {
        match command {
            LoggerCommand::Line(line) => {
                if let Err(e) = writeln!(writer, "{line}") {
                    eprintln!("lockdep: failed to write log entry: {e}");
                }
                if rx.is_empty() {
                    let _ = writer.flush();
                }
            }
            LoggerCommand::Flush(ack) => {
                let _ = writer.flush();
                let _ = ack.send(());
            }
        }
    }

    let _ = writer.flush();
}
