//! In-memory ledger of pending local mutations.

use std::collections::HashMap;
use tasknest_sync_protocol::{EntityKind, SyncRecord};

/// Map of not-yet-pushed local mutations, one entry per entity.
///
/// Recording a second change for the same `(kind, entity_id)` overwrites the
/// first: the push batch carries only the most recent unsynced record per
/// entity (last local write wins for batching purposes).
#[derive(Debug, Default)]
pub struct ChangeLedger {
    entries: HashMap<String, SyncRecord>,
}

impl ChangeLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending mutation, compacting any prior entry for the
    /// same entity.
    pub fn record(&mut self, record: SyncRecord) {
        self.entries.insert(record.entity_key(), record);
    }

    /// Returns the pending record for an entity, if any.
    pub fn get(&self, kind: EntityKind, entity_id: &str) -> Option<&SyncRecord> {
        self.entries.get(&format!("{kind}:{entity_id}"))
    }

    /// Returns a clone of every pending record.
    ///
    /// The ledger itself is untouched; entries are only dropped on `clear`
    /// once the push batch is acknowledged.
    pub fn snapshot(&self) -> Vec<SyncRecord> {
        self.entries.values().cloned().collect()
    }

    /// Drops every pending entry (all-or-nothing batch compaction).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
