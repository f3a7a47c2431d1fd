use crate::core::detector::State;
use crate::core::types::{LockHandle, LockIndex, ThreadIndex};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lock held by a thread at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldLock {
    pub thread: ThreadIndex,
    pub lock: LockIndex,
    pub lock_handle: LockHandle,
}

/// A recorded dependency edge at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Thread that created the edge
    pub thread: ThreadIndex,
    pub before: LockIndex,
    pub after: LockIndex,
    pub before_handle: LockHandle,
    pub after_handle: LockHandle,
    /// Whether the edge closed a cycle when it was recorded
    pub deadlock: bool,
    /// Rendered call stack of the acquisition that created the edge
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub backtrace: Option<String>,
}

/// Consistent snapshot of the detector's held-lock table and dependency graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// ISO-8601 timestamp of the snapshot
    pub timestamp: String,
    /// Every `(thread, lock)` currently held, sorted
    pub held: Vec<HeldLock>,
    /// Every recorded edge, sorted by `(before, after)`
    pub edges: Vec<EdgeRecord>,
}

impl DiagnosticReport {
    /// Take a snapshot of `state`. The caller holds the meta-lock.
    pub(crate) fn capture(state: &State) -> Self {
        let lock_handle = |lock| state.registry.lock_handle(lock).unwrap_or_default();

        let held = state
            .held
            .iter()
            .into_iter()
            .map(|(thread, lock)| HeldLock {
                thread,
                lock,
                lock_handle: lock_handle(lock),
            })
            .collect();

        let edges = state
            .graph
            .edges()
            .into_iter()
            .map(|((before, after), edge)| EdgeRecord {
                thread: edge.thread,
                before,
                after,
                before_handle: lock_handle(before),
                after_handle: lock_handle(after),
                deadlock: edge.deadlock,
                backtrace: edge.backtrace.as_ref().map(|bt| bt.to_string()),
            })
            .collect();

        DiagnosticReport {
            timestamp: Utc::now().to_rfc3339(),
            held,
            edges,
        }
    }

    /// Edges flagged as closing a cycle
    pub fn deadlock_edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.iter().filter(|edge| edge.deadlock)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "current locks with holding threads")?;
        writeln!(f, "========================================")?;
        for held in &self.held {
            writeln!(
                f,
                "thread {} holds lock {:#x} (id={})",
                held.thread, held.lock_handle, held.lock
            )?;
        }
        writeln!(f)?;

        writeln!(f, "recorded lock dependencies")?;
        writeln!(f, "========================================")?;
        for edge in &self.edges {
            writeln!(
                f,
                "thread {} lock {:#x} (id={}) -> lock {:#x} (id={}) {}",
                edge.thread,
                edge.before_handle,
                edge.before,
                edge.after_handle,
                edge.after,
                if edge.deadlock { "deadlock" } else { "ok" }
            )?;
            if let Some(bt) = &edge.backtrace {
                writeln!(f, "{bt}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DiagnosticReport {
        DiagnosticReport {
            timestamp: "2024-01-01T00:00:00+00:00".into(),
            held: vec![HeldLock {
                thread: 1,
                lock: 0,
                lock_handle: 0x10,
            }],
            edges: vec![
                EdgeRecord {
                    thread: 0,
                    before: 0,
                    after: 1,
                    before_handle: 0x10,
                    after_handle: 0x20,
                    deadlock: false,
                    backtrace: None,
                },
                EdgeRecord {
                    thread: 1,
                    before: 1,
                    after: 0,
                    before_handle: 0x20,
                    after_handle: 0x10,
                    deadlock: true,
                    backtrace: None,
                },
            ],
        }
    }

    #[test]
    fn test_display_lists_holds_and_edges() {
        let text = sample().to_string();
        assert!(text.contains("thread 1 holds lock 0x10 (id=0)"));
        assert!(text.contains("thread 0 lock 0x10 (id=0) -> lock 0x20 (id=1) ok"));
        assert!(text.contains("thread 1 lock 0x20 (id=1) -> lock 0x10 (id=0) deadlock"));
    }

    #[test]
    fn test_json_omits_missing_backtrace() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["edges"][1]["deadlock"], true);
        assert!(json["edges"][0].get("backtrace").is_none());
    }

    #[test]
    fn test_deadlock_edges_filter() {
        let report = sample();
        let flagged: Vec<_> = report.deadlock_edges().map(|e| (e.before, e.after)).collect();
        assert_eq!(flagged, vec![(1, 0)]);
    }
}
