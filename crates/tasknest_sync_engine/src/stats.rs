//! Rolling sync statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Maximum number of history entries retained.
const HISTORY_CAPACITY: usize = 50;

/// One completed (or failed) sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    /// When the cycle finished.
    pub timestamp: DateTime<Utc>,
    /// How long the cycle took, in milliseconds.
    pub duration_ms: u64,
    /// Number of changes moved in the cycle (pushed plus applied).
    pub change_count: usize,
    /// Whether the cycle succeeded.
    pub success: bool,
}

/// Rolling statistics over sync cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Total changes synchronized across all cycles.
    pub total_synced: u64,
    /// Total conflicts encountered across all cycles.
    pub total_conflicts: u64,
    /// Duration of the most recent cycle, in milliseconds.
    pub last_sync_duration_ms: u64,
    /// Mean cycle duration over the retained history, in milliseconds.
    pub average_sync_time_ms: u64,
    /// Bounded ring of recent cycles, oldest first.
    pub history: VecDeque<SyncHistoryEntry>,
}

impl SyncStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished cycle and refreshes the aggregates.
    pub fn record_cycle(
        &mut self,
        duration: Duration,
        change_count: usize,
        conflict_count: usize,
        success: bool,
    ) {
        let duration_ms = duration.as_millis() as u64;

        if success {
            self.total_synced += change_count as u64;
        }
        self.total_conflicts += conflict_count as u64;
        self.last_sync_duration_ms = duration_ms;

        self.history.push_back(SyncHistoryEntry {
            timestamp: Utc::now(),
            duration_ms,
            change_count,
            success,
        });
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        let total: u64 = self.history.iter().map(|e| e.duration_ms).sum();
        self.average_sync_time_ms = total / self.history.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_recording_updates_aggregates() {
        let mut stats = SyncStats::new();
        stats.record_cycle(Duration::from_millis(100), 5, 1, true);
        stats.record_cycle(Duration::from_millis(300), 2, 0, true);

        assert_eq!(stats.total_synced, 7);
        assert_eq!(stats.total_conflicts, 1);
        assert_eq!(stats.last_sync_duration_ms, 300);
        assert_eq!(stats.average_sync_time_ms, 200);
        assert_eq!(stats.history.len(), 2);
    }

    #[test]
    fn failed_cycles_do_not_count_as_synced() {
        let mut stats = SyncStats::new();
        stats.record_cycle(Duration::from_millis(50), 4, 0, false);

        assert_eq!(stats.total_synced, 0);
        assert!(!stats.history[0].success);
    }

    #[test]
    fn history_is_bounded() {
        let mut stats = SyncStats::new();
        for i in 0..60 {
            stats.record_cycle(Duration::from_millis(i), 1, 0, true);
        }

        assert_eq!(stats.history.len(), HISTORY_CAPACITY);
        // Oldest entries were evicted.
        assert_eq!(stats.history.front().unwrap().duration_ms, 10);
    }
}
