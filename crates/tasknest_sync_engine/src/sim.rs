//! Latency-simulating in-memory transport.
//!
//! `SimulatedTransport` stands in for the real sync server during
//! development and integration tests: it keeps the remote state (committed
//! changes, device registry, conflict set) in memory behind the same
//! transport contract, with configurable artificial latency on every
//! operation.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tasknest_sync_protocol::{
    merged_record, ConflictRecord, DeviceInfo, FullSyncRequest, PushRequest, Resolution,
    ResolveConflictRequest, SyncEnvelope, SyncRecord,
};

/// Remote-side state held by the simulation.
#[derive(Debug, Default)]
struct RemoteState {
    /// Latest committed record per entity key.
    heads: HashMap<String, SyncRecord>,
    /// Registered devices.
    devices: Vec<DeviceInfo>,
    /// Unresolved conflicts by id.
    conflicts: HashMap<String, ConflictRecord>,
}

/// An in-memory stand-in for the sync server.
pub struct SimulatedTransport {
    latency: Duration,
    connected: AtomicBool,
    remote: RwLock<RemoteState>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    /// Creates a simulation with no artificial latency.
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            connected: AtomicBool::new(true),
            remote: RwLock::new(RemoteState::default()),
        }
    }

    /// Creates a simulation that sleeps for `latency` on every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    /// Drops or restores the simulated connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Commits a change on the remote as if another device pushed it.
    pub fn seed_remote_change(&self, record: SyncRecord) {
        let mut remote = self.remote.write();
        remote.heads.insert(record.entity_key(), record);
    }

    /// Number of committed entity heads on the remote.
    pub fn record_count(&self) -> usize {
        self.remote.read().heads.len()
    }

    /// Returns the committed head for an entity key, if any.
    pub fn head(&self, entity_key: &str) -> Option<SyncRecord> {
        self.remote.read().heads.get(entity_key).cloned()
    }

    /// Conflicts the remote is still tracking.
    pub fn unresolved_conflicts(&self) -> Vec<ConflictRecord> {
        self.remote.read().conflicts.values().cloned().collect()
    }

    async fn simulate(&self) -> SyncResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }

    /// Applies a push batch to remote state, renumbering versions and
    /// surfacing conflicts for stale writes.
    fn accept_push(&self, changes: Vec<SyncRecord>) -> Vec<ConflictRecord> {
        let mut remote = self.remote.write();
        let mut conflicts = Vec::new();

        for mut record in changes {
            let key = record.entity_key();
            match remote.heads.get(&key) {
                Some(head) if head.version > record.version && head.checksum != record.checksum => {
                    // The pusher is behind a newer committed write.
                    let conflict = ConflictRecord::new(record, head.clone());
                    remote.conflicts.insert(conflict.id.clone(), conflict.clone());
                    conflicts.push(conflict);
                }
                Some(head) => {
                    record.version = head.version + 1;
                    remote.heads.insert(key, record);
                }
                None => {
                    record.version = record.version.max(1);
                    remote.heads.insert(key, record);
                }
            }
        }

        conflicts
    }

    fn changes_since(&self, device_id: &str, since: Option<DateTime<Utc>>) -> Vec<SyncRecord> {
        let remote = self.remote.read();
        remote
            .heads
            .values()
            .filter(|record| record.device_id != device_id)
            .filter(|record| since.map(|s| record.timestamp > s).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SyncTransport for SimulatedTransport {
    async fn initialize(&self, _config: &SyncConfig) -> SyncResult<()> {
        self.simulate().await
    }

    async fn full_sync(&self, request: FullSyncRequest) -> SyncResult<SyncEnvelope> {
        self.simulate().await?;
        let conflicts = self.accept_push(request.changes);
        let changes = self.changes_since(&request.device_id, request.last_sync_time);

        let mut envelope = SyncEnvelope::with_changes(changes);
        envelope.conflicts = conflicts;
        Ok(envelope)
    }

    async fn incremental_sync(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> SyncResult<SyncEnvelope> {
        self.simulate().await?;
        Ok(SyncEnvelope::with_changes(
            self.changes_since(device_id, Some(since)),
        ))
    }

    async fn push_changes(&self, request: PushRequest) -> SyncResult<SyncEnvelope> {
        self.simulate().await?;
        Ok(SyncEnvelope::with_conflicts(
            self.accept_push(request.changes),
        ))
    }

    async fn pull_changes(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<SyncEnvelope> {
        self.simulate().await?;
        Ok(SyncEnvelope::with_changes(
            self.changes_since(device_id, since),
        ))
    }

    async fn register_device(&self, device: DeviceInfo) -> SyncResult<()> {
        self.simulate().await?;
        let mut remote = self.remote.write();
        remote.devices.retain(|d| d.id != device.id);
        remote.devices.push(device);
        Ok(())
    }

    async fn update_device(&self, device: DeviceInfo) -> SyncResult<()> {
        self.simulate().await?;
        let mut remote = self.remote.write();
        match remote.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => {
                *existing = device;
                Ok(())
            }
            None => Err(SyncError::Protocol(format!(
                "unknown device: {}",
                device.id
            ))),
        }
    }

    async fn get_devices(&self) -> SyncResult<Vec<DeviceInfo>> {
        self.simulate().await?;
        Ok(self.remote.read().devices.clone())
    }

    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        request: ResolveConflictRequest,
    ) -> SyncResult<()> {
        self.simulate().await?;
        let mut remote = self.remote.write();
        let conflict = remote
            .conflicts
            .remove(conflict_id)
            .ok_or_else(|| SyncError::UnknownConflict(conflict_id.to_string()))?;

        let winner = match request.resolution {
            Resolution::Local => {
                let mut record = conflict.local.clone();
                record.version = conflict.local.version.max(conflict.remote.version) + 1;
                record
            }
            Resolution::Remote => conflict.remote.clone(),
            Resolution::Merge => {
                let data = request
                    .data
                    .ok_or_else(|| SyncError::MissingMergeData(conflict_id.to_string()))?;
                merged_record(&conflict, data)
            }
        };

        remote.heads.insert(winner.entity_key(), winner);
        Ok(())
    }

    async fn get_conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        self.simulate().await?;
        Ok(self.remote.read().conflicts.values().cloned().collect())
    }

    async fn check_connection(&self) -> SyncResult<bool> {
        Ok(self.connected.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tasknest_sync_protocol::{ChangeOp, EntityKind};

    fn change(device_id: &str, entity_id: &str, title: &str) -> SyncRecord {
        SyncRecord::local_change(
            EntityKind::Action,
            entity_id,
            ChangeOp::Update,
            Some(json!({"title": title})),
            device_id,
        )
    }

    #[tokio::test]
    async fn push_then_pull_from_another_device() {
        let transport = SimulatedTransport::new();

        let envelope = transport
            .push_changes(PushRequest {
                device_id: "d1".into(),
                last_sync_time: None,
                changes: vec![change("d1", "a1", "T")],
            })
            .await
            .unwrap();
        assert!(envelope.conflicts.is_empty());
        assert_eq!(transport.record_count(), 1);

        // The pushing device does not see its own change on pull.
        let own = transport.pull_changes("d1", None).await.unwrap();
        assert!(own.changes.is_empty());

        // Another device does.
        let other = transport.pull_changes("d2", None).await.unwrap();
        assert_eq!(other.changes.len(), 1);
        assert_eq!(other.changes[0].entity_id, "a1");
    }

    #[tokio::test]
    async fn combined_full_sync_pushes_and_pulls() {
        let transport = SimulatedTransport::new();
        transport.seed_remote_change(change("d2", "a2", "from beta"));

        let envelope = transport
            .full_sync(FullSyncRequest {
                device_id: "d1".into(),
                last_sync_time: None,
                changes: vec![change("d1", "a1", "from alpha")],
            })
            .await
            .unwrap();

        assert!(envelope.success);
        assert_eq!(envelope.changes.len(), 1);
        assert_eq!(envelope.changes[0].entity_id, "a2");
        assert_eq!(transport.record_count(), 2);
    }

    #[tokio::test]
    async fn stale_push_surfaces_a_conflict() {
        let transport = SimulatedTransport::new();

        let mut head = change("d2", "a1", "newer");
        head.version = 5;
        transport.seed_remote_change(head);

        let envelope = transport
            .push_changes(PushRequest {
                device_id: "d1".into(),
                last_sync_time: None,
                changes: vec![change("d1", "a1", "stale")],
            })
            .await
            .unwrap();

        assert_eq!(envelope.conflicts.len(), 1);
        assert_eq!(transport.unresolved_conflicts().len(), 1);
        // The stale write was not committed.
        let head = transport.head("actions:a1").unwrap();
        assert_eq!(head.data.unwrap()["title"], json!("newer"));
    }

    #[tokio::test]
    async fn resolving_a_conflict_commits_the_winner() {
        let transport = SimulatedTransport::new();

        let mut head = change("d2", "a1", "remote");
        head.version = 5;
        transport.seed_remote_change(head);

        let envelope = transport
            .push_changes(PushRequest {
                device_id: "d1".into(),
                last_sync_time: None,
                changes: vec![change("d1", "a1", "local")],
            })
            .await
            .unwrap();
        let conflict_id = envelope.conflicts[0].id.clone();

        transport
            .resolve_conflict(
                &conflict_id,
                ResolveConflictRequest {
                    resolution: Resolution::Local,
                    data: None,
                },
            )
            .await
            .unwrap();

        assert!(transport.unresolved_conflicts().is_empty());
        let head = transport.head("actions:a1").unwrap();
        assert_eq!(head.data.unwrap()["title"], json!("local"));
        assert_eq!(head.version, 6);
    }

    #[tokio::test]
    async fn unknown_conflict_resolution_fails() {
        let transport = SimulatedTransport::new();
        let result = transport
            .resolve_conflict(
                "missing",
                ResolveConflictRequest {
                    resolution: Resolution::Remote,
                    data: None,
                },
            )
            .await;
        assert!(matches!(result, Err(SyncError::UnknownConflict(_))));
    }

    #[tokio::test]
    async fn disconnected_simulation_rejects() {
        let transport = SimulatedTransport::new();
        transport.set_connected(false);

        assert!(!transport.check_connection().await.unwrap());
        let result = transport.pull_changes("d1", None).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[tokio::test]
    async fn incremental_filters_by_time() {
        let transport = SimulatedTransport::new();
        let cutoff = Utc::now();

        let mut old = change("d2", "a1", "old");
        old.timestamp = cutoff - chrono::Duration::minutes(10);
        transport.seed_remote_change(old);
        transport.seed_remote_change(change("d2", "a2", "new"));

        let envelope = transport.incremental_sync("d1", cutoff).await.unwrap();
        assert_eq!(envelope.changes.len(), 1);
        assert_eq!(envelope.changes[0].entity_id, "a2");
    }
}
