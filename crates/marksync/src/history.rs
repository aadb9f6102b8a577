//! Bounded audit log of sync operations.
//!
//! The last [`crate::SYNC_HISTORY_LIMIT`] operations are kept
//! most-recent-first, persisted with the rest of the engine state, and
//! surfaced to the UI. Every operation is recorded here even when its
//! user-facing notification was rate-limited away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SYNC_HISTORY_LIMIT;

/// Whether an operation was user-triggered or ran automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Triggered by the scheduler or a store change event.
    Auto,
    /// Triggered by an explicit user action.
    Manual,
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// The operation completed.
    Success,
    /// The operation failed.
    Error,
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryEntry {
    /// Auto or manual.
    pub kind: SyncKind,
    /// Success or error.
    pub outcome: SyncOutcome,
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Human-readable outcome message.
    pub message: String,
}

/// Most-recent-first ring of the last operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncHistory {
    entries: Vec<SyncHistoryEntry>,
}

impl SyncHistory {
    /// Record an operation outcome, evicting the oldest entry when full.
    pub fn record(&mut self, kind: SyncKind, outcome: SyncOutcome, message: impl Into<String>) {
        self.entries.insert(
            0,
            SyncHistoryEntry {
                kind,
                outcome,
                timestamp: Utc::now(),
                message: message.into(),
            },
        );
        self.entries.truncate(SYNC_HISTORY_LIMIT);
    }

    /// Entries, most recent first.
    #[must_use]
    pub fn entries(&self) -> &[SyncHistoryEntry] {
        &self.entries
    }

    /// The most recent entry, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&SyncHistoryEntry> {
        self.entries.first()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_first() {
        let mut history = SyncHistory::default();
        history.record(SyncKind::Manual, SyncOutcome::Success, "first");
        history.record(SyncKind::Auto, SyncOutcome::Error, "second");

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().message, "second");
        assert_eq!(history.entries()[1].message, "first");
    }

    #[test]
    fn test_bounded_at_limit() {
        let mut history = SyncHistory::default();
        for i in 0..(SYNC_HISTORY_LIMIT + 5) {
            history.record(SyncKind::Auto, SyncOutcome::Success, format!("op {i}"));
        }
        assert_eq!(history.len(), SYNC_HISTORY_LIMIT);
        // The oldest entries were evicted.
        assert_eq!(history.latest().unwrap().message, format!("op {}", SYNC_HISTORY_LIMIT + 4));
        assert_eq!(history.entries().last().unwrap().message, "op 5");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut history = SyncHistory::default();
        history.record(SyncKind::Manual, SyncOutcome::Error, "network error: timeout");

        let json = serde_json::to_string(&history).unwrap();
        assert!(json.contains("\"manual\""));
        assert!(json.contains("\"error\""));
        let back: SyncHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }
}
