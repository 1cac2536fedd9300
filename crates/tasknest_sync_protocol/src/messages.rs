//! Wire message shapes for the sync protocol.

use crate::conflict::{ConflictRecord, Resolution};
use crate::types::SyncRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current sync protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Client request for a full sync cycle (push and pull combined).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSyncRequest {
    /// Requesting device.
    pub device_id: String,
    /// The device's last successful sync time, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Buffered local changes to push.
    #[serde(default)]
    pub changes: Vec<SyncRecord>,
}

/// Client request pushing buffered local changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// Pushing device.
    pub device_id: String,
    /// The device's last successful sync time, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Changes in the batch, one per entity.
    #[serde(default)]
    pub changes: Vec<SyncRecord>,
}

/// Client request resolving a conflict on the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    /// Which side (or merge) won.
    pub resolution: Resolution,
    /// Merged payload, required when `resolution` is `Merge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response envelope shared by all sync operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnvelope {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Server time the response was produced.
    pub timestamp: DateTime<Utc>,
    /// Changes carried back to the client (pull and full sync).
    #[serde(default)]
    pub changes: Vec<SyncRecord>,
    /// Conflicts the operation surfaced.
    #[serde(default)]
    pub conflicts: Vec<ConflictRecord>,
    /// Error message when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncEnvelope {
    /// Creates an empty successful response.
    pub fn ok() -> Self {
        Self {
            success: true,
            timestamp: Utc::now(),
            changes: Vec::new(),
            conflicts: Vec::new(),
            error: None,
        }
    }

    /// Creates a successful response carrying changes.
    pub fn with_changes(changes: Vec<SyncRecord>) -> Self {
        Self {
            changes,
            ..Self::ok()
        }
    }

    /// Creates a successful response carrying conflicts.
    pub fn with_conflicts(conflicts: Vec<ConflictRecord>) -> Self {
        Self {
            conflicts,
            ..Self::ok()
        }
    }

    /// Creates a failed response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: Utc::now(),
            changes: Vec::new(),
            conflicts: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeOp, EntityKind};
    use serde_json::json;

    #[test]
    fn envelope_constructors() {
        let ok = SyncEnvelope::ok();
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = SyncEnvelope::error("remote unavailable");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("remote unavailable"));
    }

    #[test]
    fn push_request_roundtrip() {
        let change = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Create,
            Some(json!({"title": "T"})),
            "d1",
        );
        let request = PushRequest {
            device_id: "d1".into(),
            last_sync_time: Some(Utc::now()),
            changes: vec![change],
        };

        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: PushRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.device_id, "d1");
        assert_eq!(decoded.changes.len(), 1);
        assert!(decoded.last_sync_time.is_some());
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let decoded: SyncEnvelope = serde_json::from_str(
            r#"{"success": true, "timestamp": "2026-08-05T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(decoded.changes.is_empty());
        assert!(decoded.conflicts.is_empty());
    }

    #[test]
    fn merge_resolution_request_carries_data() {
        let request = ResolveConflictRequest {
            resolution: Resolution::Merge,
            data: Some(json!({"title": "Merged"})),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["resolution"], json!("merge"));
        assert_eq!(encoded["data"]["title"], json!("Merged"));
    }
}
