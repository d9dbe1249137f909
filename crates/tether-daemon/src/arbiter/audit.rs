//! Append-only audit trail of arbitration decisions
//!
//! Every admit, deny, queue, promote, and demote is recorded. The log is
//! for inspection only; nothing in the daemon reads it back on the hot path.

use std::collections::VecDeque;
use std::sync::Mutex;

use tether_core::{AgentId, ClientId};

/// Oldest entries are dropped past this point
const DEFAULT_RETENTION: usize = 10_000;

/// What the arbiter decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Input accepted and forwarded
    Admit,
    /// Input refused
    Deny,
    /// Client added to the contender queue
    Queue,
    /// Client promoted to active writer
    Promote,
    /// Client lost the active-writer role
    Demote,
}

impl Decision {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Admit => "admit",
            Decision::Deny => "deny",
            Decision::Queue => "queue",
            Decision::Promote => "promote",
            Decision::Demote => "demote",
        }
    }
}

/// One recorded arbitration decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// When the decision was made (unix millis)
    pub timestamp: u64,
    /// Client the decision concerns
    pub client_id: ClientId,
    /// Agent the input targeted
    pub agent_id: AgentId,
    /// The decision
    pub decision: Decision,
    /// Machine-readable reason ("not-active-writer", "idle", "preempted", ...)
    pub reason: String,
}

/// Bounded append-only decision log
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    retention: usize,
}

impl AuditLog {
    /// Create a log with the default retention
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Create a log retaining at most `retention` entries
    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retention,
        }
    }

    /// Append an entry, dropping the oldest past retention
    pub fn record(&self, entry: AuditEntry) {
        tracing::debug!(
            "Audit: {} {} client={} agent={}",
            entry.decision.as_str(),
            entry.reason,
            entry.client_id,
            entry.agent_id
        );
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() >= self.retention {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of every retained entry, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> AuditEntry {
        AuditEntry {
            timestamp: n,
            client_id: ClientId::from("c"),
            agent_id: AgentId::from("a"),
            decision: Decision::Admit,
            reason: "writer".to_string(),
        }
    }

    #[test]
    fn test_entries_kept_in_order() {
        let log = AuditLog::new();
        log.record(entry(1));
        log.record(entry(2));
        log.record(entry(3));

        let timestamps: Vec<u64> = log.entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1, 2, 3]);
    }

    #[test]
    fn test_retention_drops_oldest() {
        let log = AuditLog::with_retention(2);
        log.record(entry(1));
        log.record(entry(2));
        log.record(entry(3));

        let timestamps: Vec<u64> = log.entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![2, 3]);
    }
}
