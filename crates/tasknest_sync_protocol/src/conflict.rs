//! Conflict detection and automatic resolution.
//!
//! Everything in this module is pure: detection and resolution compute
//! results from the two records alone, so the engine can reuse them against
//! any transport.

use crate::checksum::payload_checksum;
use crate::merge::merge_data;
use crate::types::{ChangeOp, EntityKind, SyncRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Two records for the same entity disagree when their timestamps differ by
/// more than this many seconds; such skew suggests an unrelated stale write
/// rather than a true race, so it is never auto-resolved.
const AUTO_RESOLVE_SKEW_LIMIT_SECS: i64 = 3600;

/// Which side a conflict was resolved in favor of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local record.
    Local,
    /// Accept the remote record.
    Remote,
    /// Apply a field-level merge of both records.
    Merge,
}

/// Strategy for automatic conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The record with the later timestamp wins.
    LastWriteWins,
    /// The record with the earlier timestamp wins.
    FirstWriteWins,
    /// Attempt a field-level merge.
    Merge,
    /// Never resolve automatically.
    Manual,
}

/// A detected disagreement between two records for the same entity.
///
/// Lifecycle: created by detection, lives in the coordinator's unresolved
/// set, removed once resolution succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique conflict id.
    pub id: String,
    /// Entity both sides mutate.
    pub entity_id: String,
    /// Collection the entity belongs to.
    pub entity_kind: EntityKind,
    /// The local side of the disagreement.
    pub local: SyncRecord,
    /// The remote side of the disagreement.
    pub remote: SyncRecord,
    /// When the conflict was resolved, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Device that resolved the conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// How the conflict was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl ConflictRecord {
    /// Creates an unresolved conflict from two records of the same entity.
    pub fn new(local: SyncRecord, remote: SyncRecord) -> Self {
        debug_assert!(local.same_entity(&remote));
        Self {
            id: Uuid::new_v4().to_string(),
            entity_id: local.entity_id.clone(),
            entity_kind: local.entity_kind,
            local,
            remote,
            resolved_at: None,
            resolved_by: None,
            resolution: None,
        }
    }

    /// Marks the conflict resolved.
    pub fn mark_resolved(&mut self, resolution: Resolution, resolved_by: impl Into<String>) {
        self.resolution = Some(resolution);
        self.resolved_by = Some(resolved_by.into());
        self.resolved_at = Some(Utc::now());
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Outcome of running conflict detection over two records.
#[derive(Debug, Clone)]
pub struct ConflictCheck {
    /// Whether the records disagree.
    pub has_conflict: bool,
    /// The conflict record, when one exists.
    pub conflict: Option<ConflictRecord>,
    /// Whether the conflict may be resolved without human judgment.
    pub can_auto_resolve: bool,
    /// The resolution detection would suggest.
    pub suggested_resolution: Option<Resolution>,
}

impl ConflictCheck {
    fn none() -> Self {
        Self {
            has_conflict: false,
            conflict: None,
            can_auto_resolve: false,
            suggested_resolution: None,
        }
    }
}

/// Returns true when the pair is safe to resolve automatically.
///
/// A delete on exactly one side demands human judgment (ambiguous precedence
/// between a delete and a concurrent edit), as does timestamp skew beyond
/// the one-hour window.
fn is_auto_resolvable(local: &SyncRecord, remote: &SyncRecord) -> bool {
    let delete_mismatch = local.op.is_delete() != remote.op.is_delete();
    let skew = (local.timestamp - remote.timestamp).num_seconds().abs();
    !delete_mismatch && skew <= AUTO_RESOLVE_SKEW_LIMIT_SECS
}

/// Detects whether two records for the same entity disagree.
///
/// Records for different entities never conflict, and the same logical
/// write observed twice (equal version and equal timestamp) never
/// conflicts. `has_conflict` is symmetric in its arguments; the
/// local/remote assignment inside the conflict record is not.
pub fn detect_conflict(local: &SyncRecord, remote: &SyncRecord) -> ConflictCheck {
    if !local.same_entity(remote) {
        return ConflictCheck::none();
    }

    if local.version == remote.version && local.timestamp == remote.timestamp {
        return ConflictCheck::none();
    }

    let suggested = if local.op.is_delete() != remote.op.is_delete() {
        // Deletions win over concurrent edits.
        if local.op.is_delete() {
            Resolution::Local
        } else {
            Resolution::Remote
        }
    } else if local.timestamp > remote.timestamp {
        Resolution::Local
    } else if remote.timestamp > local.timestamp {
        Resolution::Remote
    } else {
        Resolution::Merge
    };

    ConflictCheck {
        has_conflict: true,
        can_auto_resolve: is_auto_resolvable(local, remote),
        conflict: Some(ConflictRecord::new(local.clone(), remote.clone())),
        suggested_resolution: Some(suggested),
    }
}

/// Attempts to resolve a conflict without human input.
///
/// Returns `None` when the conflict is not auto-resolvable, when the
/// strategy is `Manual`, or when a merge produced field-level conflicts.
/// `LastWriteWins` and `FirstWriteWins` return the chosen side's record
/// unchanged; a successful merge yields a new record with
/// `version = max(local, remote) + 1`, a fresh timestamp, and a recomputed
/// checksum.
pub fn auto_resolve(conflict: &ConflictRecord, strategy: ResolutionStrategy) -> Option<SyncRecord> {
    if !is_auto_resolvable(&conflict.local, &conflict.remote) {
        return None;
    }

    match strategy {
        ResolutionStrategy::Manual => None,
        ResolutionStrategy::LastWriteWins => {
            if conflict.local.timestamp > conflict.remote.timestamp {
                Some(conflict.local.clone())
            } else {
                Some(conflict.remote.clone())
            }
        }
        ResolutionStrategy::FirstWriteWins => {
            if conflict.remote.timestamp < conflict.local.timestamp {
                Some(conflict.remote.clone())
            } else {
                Some(conflict.local.clone())
            }
        }
        ResolutionStrategy::Merge => {
            let local_data = conflict.local.data.as_ref()?;
            let remote_data = conflict.remote.data.as_ref()?;

            let outcome = merge_data(local_data, remote_data, conflict.entity_kind);
            if !outcome.success || !outcome.conflicts.is_empty() {
                return None;
            }
            let merged = outcome.merged?;

            Some(merged_record(conflict, merged))
        }
    }
}

/// Builds the record carrying merged data for a conflict.
pub fn merged_record(conflict: &ConflictRecord, merged: serde_json::Value) -> SyncRecord {
    let checksum = payload_checksum(Some(&merged));
    SyncRecord {
        id: Uuid::new_v4().to_string(),
        entity_id: conflict.entity_id.clone(),
        entity_kind: conflict.entity_kind,
        op: ChangeOp::Update,
        timestamp: Utc::now(),
        device_id: conflict.local.device_id.clone(),
        version: conflict.local.version.max(conflict.remote.version) + 1,
        checksum,
        data: Some(merged),
    }
}

/// Boundary check before a resolution record is applied.
///
/// The record must reference the conflict's entity, and must carry
/// structured data unless it is a delete.
pub fn validate_resolution(conflict: &ConflictRecord, resolution: &SyncRecord) -> bool {
    resolution.entity_id == conflict.entity_id
        && resolution.entity_kind == conflict.entity_kind
        && (resolution.op.is_delete() || resolution.data.is_some())
}
