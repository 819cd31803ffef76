use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for control channel activity
#[derive(Debug, Default)]
pub struct ChannelStats {
    /// Events that committed a transition
    pub events_applied: AtomicU64,
    /// Well-formed events refused by the state machine or lock timeout
    pub events_rejected: AtomicU64,
    /// Messages refused before reaching the state machine
    pub malformed_messages: AtomicU64,
    pub drains_completed: AtomicU64,
    pub drains_failed: AtomicU64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self, succeeded: bool) {
        if succeeded {
            self.drains_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.drains_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            drains_completed: self.drains_completed.load(Ordering::Relaxed),
            drains_failed: self.drains_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of control channel statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStatsSnapshot {
    pub events_applied: u64,
    pub events_rejected: u64,
    pub malformed_messages: u64,
    pub drains_completed: u64,
    pub drains_failed: u64,
}

impl ChannelStatsSnapshot {
    /// Total events seen, malformed ones included
    pub fn total_events(&self) -> u64 {
        self.events_applied + self.events_rejected + self.malformed_messages
    }
}
