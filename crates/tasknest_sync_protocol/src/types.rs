//! Core sync record and device types.

use crate::checksum::payload_checksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The closed set of entity collections that participate in sync.
///
/// Every replicated mutation names exactly one of these kinds. Keeping the
/// set closed lets merge and storage dispatch be checked for exhaustiveness
/// at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Unprocessed inbox capture.
    InboxItem,
    /// Next action.
    Action,
    /// Multi-step project.
    Project,
    /// Context a task is performed in.
    Context,
    /// Delegated item awaited from someone else.
    WaitingItem,
    /// Calendar-bound item with fixed start/end times.
    CalendarItem,
}

impl EntityKind {
    /// All entity kinds, in collection order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::InboxItem,
        EntityKind::Action,
        EntityKind::Project,
        EntityKind::Context,
        EntityKind::WaitingItem,
        EntityKind::CalendarItem,
    ];

    /// Returns the collection name used for storage and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::InboxItem => "inbox_items",
            EntityKind::Action => "actions",
            EntityKind::Project => "projects",
            EntityKind::Context => "contexts",
            EntityKind::WaitingItem => "waiting_items",
            EntityKind::CalendarItem => "calendar_items",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of mutation a sync record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Entity was created.
    Create,
    /// Entity was updated.
    Update,
    /// Entity was deleted.
    Delete,
}

impl ChangeOp {
    /// Returns true for delete operations.
    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeOp::Delete)
    }
}

/// One mutation of one entity from one device.
///
/// Records are immutable once created. The `checksum` is a deterministic
/// hash of `data` (order-independent field serialization) used for cheap
/// equality comparison across devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Unique record id.
    pub id: String,
    /// Id of the entity this record mutates.
    pub entity_id: String,
    /// Collection the entity belongs to.
    pub entity_kind: EntityKind,
    /// The mutation kind.
    pub op: ChangeOp,
    /// Wall-clock time the mutation was recorded.
    pub timestamp: DateTime<Utc>,
    /// Device that produced the mutation.
    pub device_id: String,
    /// Entity version. Monotonic per entity in the happy path.
    pub version: u32,
    /// Checksum over `data`.
    pub checksum: String,
    /// Entity payload. `None` for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SyncRecord {
    /// Creates a record for a fresh local mutation.
    ///
    /// The version is provisional (`1`); the remote renumbers it on push
    /// acknowledgment.
    pub fn local_change(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        op: ChangeOp,
        data: Option<Value>,
        device_id: impl Into<String>,
    ) -> Self {
        let checksum = payload_checksum(data.as_ref());
        Self {
            id: Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            entity_kind,
            op,
            timestamp: Utc::now(),
            device_id: device_id.into(),
            version: 1,
            checksum,
            data,
        }
    }

    /// Returns the ledger key for this record: `<collection>:<entity_id>`.
    pub fn entity_key(&self) -> String {
        format!("{}:{}", self.entity_kind, self.entity_id)
    }

    /// Returns true if this record and `other` mutate the same entity.
    pub fn same_entity(&self, other: &SyncRecord) -> bool {
        self.entity_id == other.entity_id && self.entity_kind == other.entity_kind
    }
}

/// Kind of physical client device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Desktop or laptop client.
    Desktop,
    /// Phone client.
    Mobile,
    /// Tablet client.
    Tablet,
}

/// One physical client in the device registry.
///
/// Registered at coordinator initialization and refreshed on each sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device id.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// Device form factor.
    pub kind: DeviceKind,
    /// Operating system / platform string.
    pub platform: String,
    /// Last time the device completed a sync.
    pub last_seen: DateTime<Utc>,
    /// Whether the device is still in active use.
    pub is_active: bool,
}

impl DeviceInfo {
    /// Creates a new active device entry with `last_seen = now`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: DeviceKind,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            platform: platform.into(),
            last_seen: Utc::now(),
            is_active: true,
        }
    }

    /// Stamps the device as seen now.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_kind_names() {
        assert_eq!(EntityKind::Action.as_str(), "actions");
        assert_eq!(EntityKind::CalendarItem.as_str(), "calendar_items");
        assert_eq!(EntityKind::ALL.len(), 6);
    }

    #[test]
    fn entity_kind_serde() {
        let kind: EntityKind = serde_json::from_str("\"waiting_items\"").unwrap();
        assert_eq!(kind, EntityKind::WaitingItem);
        assert_eq!(
            serde_json::to_string(&EntityKind::InboxItem).unwrap(),
            "\"inbox_items\""
        );
    }

    #[test]
    fn local_change_is_provisional() {
        let record = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Create,
            Some(json!({"title": "Write report"})),
            "device-1",
        );

        assert_eq!(record.version, 1);
        assert_eq!(record.entity_key(), "actions:a1");
        assert!(!record.checksum.is_empty());
        assert_eq!(record.device_id, "device-1");
    }

    #[test]
    fn checksum_is_field_order_independent() {
        let a = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "T", "status": "next"})),
            "d1",
        );
        let b = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"status": "next", "title": "T"})),
            "d1",
        );

        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn same_entity_requires_kind_and_id() {
        let a = SyncRecord::local_change(EntityKind::Action, "x", ChangeOp::Create, None, "d");
        let b = SyncRecord::local_change(EntityKind::Project, "x", ChangeOp::Create, None, "d");
        let c = SyncRecord::local_change(EntityKind::Action, "x", ChangeOp::Delete, None, "d");

        assert!(!a.same_entity(&b));
        assert!(a.same_entity(&c));
    }

    #[test]
    fn record_roundtrip() {
        let record = SyncRecord::local_change(
            EntityKind::Project,
            "p1",
            ChangeOp::Update,
            Some(json!({"title": "Launch", "progress": 40})),
            "d1",
        );

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: SyncRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn delete_record_omits_data() {
        let record =
            SyncRecord::local_change(EntityKind::Action, "a1", ChangeOp::Delete, None, "d1");
        let encoded = serde_json::to_value(&record).unwrap();
        assert!(encoded.get("data").is_none());
        assert!(record.op.is_delete());
    }
}
