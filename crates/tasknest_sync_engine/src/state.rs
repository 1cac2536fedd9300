//! Sync state machine snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The current phase of the sync state machine.
///
/// Transitions are `Idle → Syncing → {Success, Error}`; a finished state
/// returns to `Syncing` on the next invocation. Entering `Syncing` while
/// already syncing is rejected, never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No sync has run yet, or the engine is between cycles.
    Idle,
    /// A sync cycle is in flight.
    Syncing,
    /// The last cycle completed.
    Success,
    /// The last cycle failed.
    Error,
}

impl SyncStatus {
    /// Returns true if a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }

    /// Returns true if a new cycle may start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_syncing()
    }
}

/// Snapshot of the coordinator's sync state.
///
/// Persisted to a device-local meta key on every mutation so restarts
/// resume with known timestamps. The ledger itself is not persisted, so
/// `pending_changes` is recomputed from the (empty) ledger on rehydration
/// rather than trusted from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Current phase.
    pub status: SyncStatus,
    /// When the last sync cycle finished (success or failure).
    pub last_sync_time: Option<DateTime<Utc>>,
    /// When the last successful cycle finished.
    pub last_success_time: Option<DateTime<Utc>>,
    /// Number of buffered local changes awaiting push.
    pub pending_changes: usize,
    /// Number of unresolved conflicts.
    pub conflict_count: usize,
    /// Message from the last failed cycle.
    pub error: Option<String>,
    /// Whether the auto-sync timer is running.
    pub auto_sync_enabled: bool,
    /// Auto-sync interval in milliseconds.
    pub sync_interval_ms: u64,
}

impl SyncState {
    /// Creates an idle state with the given auto-sync interval.
    pub fn new(sync_interval_ms: u64) -> Self {
        Self {
            status: SyncStatus::Idle,
            last_sync_time: None,
            last_success_time: None,
            pending_changes: 0,
            conflict_count: 0,
            error: None,
            auto_sync_enabled: false,
            sync_interval_ms,
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(300_000)
    }
}
