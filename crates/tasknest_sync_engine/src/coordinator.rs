//! Sync coordinator: owns the ledger, the state machine, and the cycle
//! orchestration.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::ledger::ChangeLedger;
use crate::state::{SyncState, SyncStatus};
use crate::stats::SyncStats;
use crate::storage::LocalStore;
use crate::transport::SyncTransport;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasknest_sync_protocol::{
    auto_resolve, detect_conflict, merged_record, validate_resolution, ChangeOp, ConflictRecord,
    EntityKind, PushRequest, Resolution, ResolutionStrategy, ResolveConflictRequest, SyncRecord,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Meta key the sync state snapshot is persisted under.
const SYNC_STATE_KEY: &str = "tasknest.sync_state";

/// Result of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleReport {
    /// Local changes pushed to the remote.
    pub pushed: usize,
    /// Remote changes applied to local storage.
    pub applied: usize,
    /// Conflicts detected during the cycle.
    pub conflicts_detected: usize,
    /// Conflicts resolved by the automatic pass.
    pub auto_resolved: usize,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

/// Orchestrates full and incremental sync cycles against an injected
/// transport and local store.
///
/// The coordinator is the only writer of the ledger, the conflict set, and
/// the sync state; collaborators read them or call `record_local_change`.
/// At most one cycle is in flight: the `Syncing` guard is checked and set
/// synchronously before any suspension point, so a second invocation fails
/// with [`SyncError::SyncInProgress`] instead of queueing.
pub struct SyncCoordinator<T: SyncTransport, S: LocalStore> {
    config: SyncConfig,
    transport: Arc<T>,
    store: Arc<S>,
    ledger: Mutex<ChangeLedger>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    conflicts: RwLock<HashMap<String, ConflictRecord>>,
    events: EventBus,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
}

impl<T: SyncTransport, S: LocalStore> SyncCoordinator<T, S> {
    /// Creates a coordinator with injected dependencies.
    pub fn new(config: SyncConfig, transport: Arc<T>, store: Arc<S>) -> Self {
        let state = SyncState::new(config.sync_interval.as_millis() as u64);
        Self {
            config,
            transport,
            store,
            ledger: Mutex::new(ChangeLedger::new()),
            state: RwLock::new(state),
            stats: RwLock::new(SyncStats::new()),
            conflicts: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            auto_sync: Mutex::new(None),
        }
    }

    /// Rehydrates persisted state, prepares the transport, and registers
    /// this device.
    ///
    /// The ledger is not persisted across restarts, so `pending_changes` is
    /// recomputed from the (empty) ledger rather than trusted from disk.
    pub async fn initialize(&self) -> SyncResult<()> {
        if let Some(raw) = self.store.get_meta(SYNC_STATE_KEY).await? {
            match serde_json::from_str::<SyncState>(&raw) {
                Ok(mut persisted) => {
                    persisted.status = SyncStatus::Idle;
                    persisted.pending_changes = self.ledger.lock().len();
                    persisted.auto_sync_enabled = false;
                    *self.state.write() = persisted;
                }
                Err(e) => warn!(error = %e, "discarding unreadable persisted sync state"),
            }
        }

        self.transport.initialize(&self.config).await?;
        self.transport
            .register_device(self.config.device.clone())
            .await?;

        // Pick up conflicts the remote recorded while this device was away.
        let remote_conflicts = self.transport.get_conflicts().await?;
        if !remote_conflicts.is_empty() {
            let mut conflicts = self.conflicts.write();
            for conflict in remote_conflicts {
                conflicts.insert(conflict.id.clone(), conflict);
            }
        }
        self.state.write().conflict_count = self.conflicts.read().len();

        info!(device = %self.config.device.id, "sync coordinator initialized");
        self.persist_state().await;
        Ok(())
    }

    /// Checks whether the remote is reachable.
    pub async fn check_connection(&self) -> SyncResult<bool> {
        self.transport.check_connection().await
    }

    /// Subscribes to sync lifecycle events.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns a snapshot of the sync state.
    pub fn sync_state(&self) -> SyncState {
        self.state.read().clone()
    }

    /// Returns a snapshot of the rolling statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Conflicts awaiting resolution.
    pub fn unresolved_conflicts(&self) -> Vec<ConflictRecord> {
        self.conflicts.read().values().cloned().collect()
    }

    /// Buffers a local mutation for the next push.
    ///
    /// Synchronous and O(1): the record is checksummed, stamped with this
    /// device and a provisional version, and compacted into the ledger,
    /// overwriting any prior pending entry for the same entity.
    pub fn record_local_change(
        &self,
        kind: EntityKind,
        entity_id: &str,
        op: ChangeOp,
        data: Option<Value>,
    ) -> SyncRecord {
        let record =
            SyncRecord::local_change(kind, entity_id, op, data, self.config.device.id.clone());

        let pending = {
            let mut ledger = self.ledger.lock();
            ledger.record(record.clone());
            ledger.len()
        };
        self.state.write().pending_changes = pending;

        debug!(entity = %record.entity_key(), pending, "recorded local change");
        record
    }

    /// Runs a full sync cycle: push, pull, then automatic conflict
    /// resolution, in that fixed order.
    pub async fn full_sync(&self) -> SyncResult<SyncCycleReport> {
        self.begin_cycle()?;
        let started = Instant::now();

        let result = self.run_full_cycle().await;
        self.finish_cycle(result, started).await
    }

    /// Runs an incremental (pull-only) sync cycle.
    ///
    /// Without a prior sync time there is no baseline to be incremental
    /// against, so the call delegates to [`full_sync`](Self::full_sync).
    pub async fn incremental_sync(&self) -> SyncResult<SyncCycleReport> {
        let baseline = self.state.read().last_sync_time;
        let Some(since) = baseline else {
            return self.full_sync().await;
        };

        self.begin_cycle()?;
        let started = Instant::now();

        let result = self.run_incremental_cycle(since).await;
        self.finish_cycle(result, started).await
    }

    /// Pushes buffered local changes without running a pull.
    pub async fn push_local_changes(&self) -> SyncResult<usize> {
        if self.state.read().status.is_syncing() {
            return Err(SyncError::SyncInProgress);
        }

        let (pushed, _) = self.push_phase().await?;
        self.persist_state().await;
        Ok(pushed)
    }

    /// Resolves a pending conflict.
    ///
    /// For `Local`/`Remote` the corresponding record is applied as-is; for
    /// `Merge` the caller supplies already-merged data, which is wrapped
    /// into a new record with a bumped version. The resolution is applied
    /// locally, reported to the transport so the remote converges, and the
    /// conflict is dropped from the unresolved set.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: Resolution,
        data: Option<Value>,
    ) -> SyncResult<SyncRecord> {
        let conflict = self
            .conflicts
            .read()
            .get(conflict_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownConflict(conflict_id.to_string()))?;

        let record = match resolution {
            Resolution::Local => conflict.local.clone(),
            Resolution::Remote => conflict.remote.clone(),
            Resolution::Merge => {
                let merged = data
                    .clone()
                    .ok_or_else(|| SyncError::MissingMergeData(conflict_id.to_string()))?;
                merged_record(&conflict, merged)
            }
        };

        if !validate_resolution(&conflict, &record) {
            return Err(SyncError::InvalidResolution(conflict_id.to_string()));
        }

        self.apply_record(&record).await?;
        self.transport
            .resolve_conflict(conflict_id, ResolveConflictRequest { resolution, data })
            .await?;

        let remaining = {
            let mut conflicts = self.conflicts.write();
            conflicts.remove(conflict_id);
            conflicts.len()
        };
        self.state.write().conflict_count = remaining;
        self.persist_state().await;

        info!(conflict = conflict_id, ?resolution, "conflict resolved");
        Ok(record)
    }

    /// Starts (or restarts) the auto-sync timer.
    ///
    /// Each tick runs an incremental sync and logs failures without
    /// propagating them, so the timer survives transient errors. After
    /// consecutive failures the delay stretches by the configured backoff,
    /// resetting once a tick succeeds.
    pub fn start_auto_sync(self: &Arc<Self>)
    where
        T: 'static,
        S: 'static,
    {
        self.stop_auto_sync();

        {
            let mut state = self.state.write();
            state.auto_sync_enabled = true;
            state.sync_interval_ms = self.config.sync_interval.as_millis() as u64;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                let delay =
                    this.config.sync_interval + this.config.retry.delay_for_failures(failures);
                tokio::time::sleep(delay).await;

                match this.incremental_sync().await {
                    Ok(report) => {
                        failures = 0;
                        debug!(applied = report.applied, "auto-sync tick completed");
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        warn!(error = %e, consecutive = failures, "auto-sync tick failed");
                    }
                }
            }
        });

        *self.auto_sync.lock() = Some(handle);
        info!(interval = ?self.config.sync_interval, "auto-sync started");
    }

    /// Stops the auto-sync timer.
    pub fn stop_auto_sync(&self) {
        if let Some(handle) = self.auto_sync.lock().take() {
            handle.abort();
            info!("auto-sync stopped");
        }
        self.state.write().auto_sync_enabled = false;
    }

    /// Returns true while the auto-sync timer is running.
    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync.lock().is_some()
    }

    // === cycle internals ===

    /// Enters the `Syncing` state, rejecting a second concurrent cycle.
    ///
    /// Checked and set synchronously before any suspension point; this is
    /// the whole mutual-exclusion story on a single-writer coordinator.
    fn begin_cycle(&self) -> SyncResult<()> {
        {
            let mut state = self.state.write();
            if state.status.is_syncing() {
                return Err(SyncError::SyncInProgress);
            }
            state.status = SyncStatus::Syncing;
            state.error = None;
        }
        self.events.emit(SyncEvent::Started);
        Ok(())
    }

    async fn run_full_cycle(&self) -> SyncResult<SyncCycleReport> {
        let mut report = SyncCycleReport::default();

        self.emit_progress(1, 3, "pushing local changes");
        let (pushed, push_conflicts) = self.push_phase().await?;
        report.pushed = pushed;
        report.conflicts_detected += push_conflicts;

        self.emit_progress(2, 3, "applying remote changes");
        let since = self.state.read().last_sync_time;
        let envelope = self
            .transport
            .pull_changes(&self.config.device.id, since)
            .await?;
        for remote in envelope.changes {
            if self.apply_remote_change(remote).await? {
                report.applied += 1;
            } else {
                report.conflicts_detected += 1;
            }
        }

        self.emit_progress(3, 3, "resolving conflicts");
        report.auto_resolved = self.auto_resolution_pass().await?;

        Ok(report)
    }

    async fn run_incremental_cycle(&self, since: chrono::DateTime<Utc>) -> SyncResult<SyncCycleReport> {
        let mut report = SyncCycleReport::default();

        let envelope = self
            .transport
            .incremental_sync(&self.config.device.id, since)
            .await?;
        let total = envelope.changes.len();
        self.emit_progress(0, total, "applying remote changes");

        for (i, remote) in envelope.changes.into_iter().enumerate() {
            if self.apply_remote_change(remote).await? {
                report.applied += 1;
            } else {
                report.conflicts_detected += 1;
            }
            self.emit_progress(i + 1, total, "applying remote changes");
        }

        Ok(report)
    }

    /// Pushes the current ledger batch and compacts it on acknowledgment.
    ///
    /// The ledger is cleared only after the transport accepted the batch; a
    /// failed push leaves every entry pending for the next cycle, which is
    /// the system's only retry mechanism.
    async fn push_phase(&self) -> SyncResult<(usize, usize)> {
        let batch = self.ledger.lock().snapshot();
        let batch_len = batch.len();

        let request = PushRequest {
            device_id: self.config.device.id.clone(),
            last_sync_time: self.state.read().last_sync_time,
            changes: batch,
        };
        let envelope = self.transport.push_changes(request).await?;

        {
            let mut ledger = self.ledger.lock();
            ledger.clear();
        }
        self.state.write().pending_changes = 0;

        let conflict_count = envelope.conflicts.len();
        for conflict in envelope.conflicts {
            self.track_conflict(conflict);
        }

        debug!(pushed = batch_len, conflicts = conflict_count, "push phase done");
        Ok((batch_len, conflict_count))
    }

    /// Applies one remote change to local storage, unless it collides with
    /// a buffered local edit.
    ///
    /// Returns true when the change was applied; false when it was held
    /// back as a conflict (the local pending edit is preserved until the
    /// conflict is resolved).
    async fn apply_remote_change(&self, remote: SyncRecord) -> SyncResult<bool> {
        let buffered = self
            .ledger
            .lock()
            .get(remote.entity_kind, &remote.entity_id)
            .cloned();

        if let Some(local) = buffered {
            let check = detect_conflict(&local, &remote);
            if check.has_conflict {
                if let Some(conflict) = check.conflict {
                    self.track_conflict(conflict);
                }
                return Ok(false);
            }
        }

        self.apply_record(&remote).await?;
        Ok(true)
    }

    /// Dispatches a record to the store by operation.
    async fn apply_record(&self, record: &SyncRecord) -> SyncResult<()> {
        match record.op {
            ChangeOp::Create | ChangeOp::Update => match &record.data {
                Some(data) => {
                    self.store
                        .upsert(record.entity_kind, &record.entity_id, data.clone())
                        .await
                }
                None => {
                    warn!(entity = %record.entity_key(), "skipping upsert without payload");
                    Ok(())
                }
            },
            ChangeOp::Delete => {
                self.store
                    .remove(record.entity_kind, &record.entity_id)
                    .await
            }
        }
    }

    /// Attempts last-write-wins resolution for every pending conflict.
    async fn auto_resolution_pass(&self) -> SyncResult<usize> {
        let pending: Vec<ConflictRecord> = self.conflicts.read().values().cloned().collect();
        let mut resolved = 0;

        for conflict in pending {
            match auto_resolve(&conflict, ResolutionStrategy::LastWriteWins) {
                Some(record) => {
                    self.apply_record(&record).await?;
                    self.conflicts.write().remove(&conflict.id);
                    resolved += 1;
                }
                None => {
                    debug!(conflict = %conflict.id, "left for manual resolution");
                }
            }
        }

        self.state.write().conflict_count = self.conflicts.read().len();
        Ok(resolved)
    }

    /// Settles state, stats, persistence, and events for a finished cycle.
    async fn finish_cycle(
        &self,
        result: SyncResult<SyncCycleReport>,
        started: Instant,
    ) -> SyncResult<SyncCycleReport> {
        let duration = started.elapsed();

        match result {
            Ok(mut report) => {
                report.duration = duration;
                let now = Utc::now();
                {
                    let mut state = self.state.write();
                    state.status = SyncStatus::Success;
                    state.last_sync_time = Some(now);
                    state.last_success_time = Some(now);
                    state.pending_changes = self.ledger.lock().len();
                    state.error = None;
                }
                self.stats.write().record_cycle(
                    duration,
                    report.pushed + report.applied,
                    report.conflicts_detected,
                    true,
                );
                self.refresh_device().await;
                self.persist_state().await;
                self.events.emit(SyncEvent::Completed(self.stats()));
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut state = self.state.write();
                    state.status = SyncStatus::Error;
                    state.error = Some(message.clone());
                }
                self.stats.write().record_cycle(duration, 0, 0, false);
                self.persist_state().await;
                self.events.emit(SyncEvent::Failed(message));
                Err(e)
            }
        }
    }

    /// Stamps this device as seen on the remote registry.
    ///
    /// Registry refresh is bookkeeping: a failure is logged, never fatal to
    /// the cycle that already succeeded.
    async fn refresh_device(&self) {
        let mut device = self.config.device.clone();
        device.touch();
        if let Err(e) = self.transport.update_device(device).await {
            debug!(error = %e, "device registry refresh failed");
        }
    }

    fn track_conflict(&self, conflict: ConflictRecord) {
        let count = {
            let mut conflicts = self.conflicts.write();
            conflicts.insert(conflict.id.clone(), conflict.clone());
            conflicts.len()
        };
        self.state.write().conflict_count = count;
        self.events.emit(SyncEvent::Conflict(conflict));
    }

    fn emit_progress(&self, current: usize, total: usize, message: &str) {
        self.events.emit(SyncEvent::Progress {
            current,
            total,
            message: message.to_string(),
        });
    }

    /// Persists the state snapshot; best-effort outside initialization.
    async fn persist_state(&self) {
        let snapshot = self.state.read().clone();
        match serde_json::to_string(&snapshot) {
            Ok(raw) => {
                if let Err(e) = self.store.put_meta(SYNC_STATE_KEY, raw).await {
                    warn!(error = %e, "failed to persist sync state");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize sync state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::MockTransport;
    use serde_json::json;
    use tasknest_sync_protocol::{DeviceInfo, DeviceKind, SyncEnvelope};

    fn coordinator() -> SyncCoordinator<MockTransport, MemoryStore> {
        let device = DeviceInfo::new("d1", "Laptop", DeviceKind::Desktop, "linux");
        let config = SyncConfig::new("https://sync.tasknest.app", device);
        SyncCoordinator::new(config, Arc::new(MockTransport::new()), Arc::new(MemoryStore::new()))
    }

    fn remote_change(entity_id: &str, title: &str) -> SyncRecord {
        let mut record = SyncRecord::local_change(
            EntityKind::Action,
            entity_id,
            ChangeOp::Update,
            Some(json!({"title": title})),
            "d2",
        );
        record.version = 2;
        record
    }

    #[tokio::test]
    async fn pending_count_tracks_the_ledger() {
        let coordinator = coordinator();

        coordinator.record_local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Create,
            Some(json!({"title": "T"})),
        );
        assert_eq!(coordinator.sync_state().pending_changes, 1);

        // Second write to the same entity compacts, not queues.
        coordinator.record_local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "U"})),
        );
        assert_eq!(coordinator.sync_state().pending_changes, 1);

        let pushed = coordinator.push_local_changes().await.unwrap();
        assert_eq!(pushed, 1);
        assert_eq!(coordinator.sync_state().pending_changes, 0);
    }

    #[tokio::test]
    async fn full_sync_pushes_pulls_and_updates_state() {
        let coordinator = coordinator();
        coordinator
            .transport
            .set_pull_response(SyncEnvelope::with_changes(vec![remote_change("a9", "R")]));

        coordinator.record_local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Create,
            Some(json!({"title": "T"})),
        );

        let report = coordinator.full_sync().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.applied, 1);

        let state = coordinator.sync_state();
        assert_eq!(state.status, SyncStatus::Success);
        assert_eq!(state.pending_changes, 0);
        assert!(state.last_success_time.is_some());

        // The pulled change landed in storage.
        assert_eq!(
            coordinator.store.get(EntityKind::Action, "a9").unwrap()["title"],
            json!("R")
        );
    }

    #[tokio::test]
    async fn failed_sync_leaves_the_ledger_untouched() {
        let coordinator = coordinator();
        coordinator.transport.fail_with("remote down");

        coordinator.record_local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Create,
            Some(json!({"title": "T"})),
        );

        let result = coordinator.full_sync().await;
        assert!(result.is_err());

        let state = coordinator.sync_state();
        assert_eq!(state.status, SyncStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("remote down"));
        assert_eq!(state.pending_changes, 1);

        // The next cycle retries the same batch.
        coordinator.transport.clear_failure();
        coordinator.full_sync().await.unwrap();
        assert_eq!(coordinator.sync_state().pending_changes, 0);
    }

    #[tokio::test]
    async fn incremental_without_baseline_delegates_to_full_sync() {
        let coordinator = coordinator();

        coordinator.incremental_sync().await.unwrap();
        assert_eq!(coordinator.transport.push_calls(), 1);
        assert_eq!(coordinator.transport.pull_calls(), 1);
        assert_eq!(coordinator.transport.incremental_calls(), 0);

        // With a baseline, incremental only pulls incrementally.
        coordinator.incremental_sync().await.unwrap();
        assert_eq!(coordinator.transport.push_calls(), 1);
        assert_eq!(coordinator.transport.pull_calls(), 1);
        assert_eq!(coordinator.transport.incremental_calls(), 1);
    }

    #[tokio::test]
    async fn incremental_pull_conflict_preserves_the_local_pending_edit() {
        let coordinator = coordinator();

        // Establish a baseline so the next cycle is a pure pull.
        coordinator.full_sync().await.unwrap();

        let local = coordinator.record_local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "local"})),
        );

        let mut remote = remote_change("a1", "remote");
        remote.timestamp = local.timestamp + chrono::Duration::minutes(5);
        coordinator
            .transport
            .set_incremental_response(SyncEnvelope::with_changes(vec![remote]));

        let report = coordinator.incremental_sync().await.unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.conflicts_detected, 1);

        // The remote change was not applied and the local edit stays
        // buffered until the conflict is resolved.
        assert!(coordinator.store.get(EntityKind::Action, "a1").is_none());
        assert_eq!(coordinator.unresolved_conflicts().len(), 1);
        assert_eq!(coordinator.sync_state().conflict_count, 1);
    }

    #[tokio::test]
    async fn full_cycle_auto_resolves_push_conflicts() {
        let coordinator = coordinator();

        let local = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "stale"})),
            "d1",
        );
        let mut remote = remote_change("a1", "newer");
        remote.timestamp = local.timestamp + chrono::Duration::minutes(5);
        let conflict = ConflictRecord::new(local, remote);
        coordinator
            .transport
            .set_push_response(SyncEnvelope::with_conflicts(vec![conflict]));

        let report = coordinator.full_sync().await.unwrap();
        assert_eq!(report.conflicts_detected, 1);
        assert_eq!(report.auto_resolved, 1);

        // Last write wins: the newer remote side was applied.
        assert_eq!(
            coordinator.store.get(EntityKind::Action, "a1").unwrap()["title"],
            json!("newer")
        );
        assert!(coordinator.unresolved_conflicts().is_empty());
    }

    #[tokio::test]
    async fn delete_edit_conflicts_stay_pending() {
        let coordinator = coordinator();

        let local = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "edited"})),
            "d1",
        );
        let mut remote =
            SyncRecord::local_change(EntityKind::Action, "a1", ChangeOp::Delete, None, "d2");
        remote.version = 3;
        remote.timestamp = local.timestamp + chrono::Duration::minutes(1);
        let conflict = ConflictRecord::new(local, remote);
        coordinator
            .transport
            .set_push_response(SyncEnvelope::with_conflicts(vec![conflict]));

        let report = coordinator.full_sync().await.unwrap();
        assert_eq!(report.conflicts_detected, 1);
        assert_eq!(report.auto_resolved, 0);
        assert_eq!(coordinator.unresolved_conflicts().len(), 1);
        assert_eq!(coordinator.sync_state().conflict_count, 1);
    }

    #[tokio::test]
    async fn resolve_conflict_applies_and_notifies() {
        let coordinator = coordinator();

        let local = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "local"})),
            "d1",
        );
        let mut remote = remote_change("a1", "remote");
        remote.timestamp = local.timestamp + chrono::Duration::minutes(1);
        let conflict = ConflictRecord::new(local, remote);
        let conflict_id = conflict.id.clone();
        coordinator.track_conflict(conflict);

        let resolved = coordinator
            .resolve_conflict(&conflict_id, Resolution::Remote, None)
            .await
            .unwrap();
        assert_eq!(resolved.data.as_ref().unwrap()["title"], json!("remote"));

        assert!(coordinator.unresolved_conflicts().is_empty());
        assert_eq!(coordinator.sync_state().conflict_count, 0);
        let resolutions = coordinator.transport.resolutions();
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].0, conflict_id);
    }

    #[tokio::test]
    async fn merge_resolution_requires_data() {
        let coordinator = coordinator();

        let local = SyncRecord::local_change(
            EntityKind::Action,
            "a1",
            ChangeOp::Update,
            Some(json!({"title": "local"})),
            "d1",
        );
        let remote = remote_change("a1", "remote");
        let conflict = ConflictRecord::new(local, remote);
        let conflict_id = conflict.id.clone();
        coordinator.track_conflict(conflict);

        let result = coordinator
            .resolve_conflict(&conflict_id, Resolution::Merge, None)
            .await;
        assert!(matches!(result, Err(SyncError::MissingMergeData(_))));

        let resolved = coordinator
            .resolve_conflict(&conflict_id, Resolution::Merge, Some(json!({"title": "merged"})))
            .await
            .unwrap();
        assert_eq!(resolved.version, 3);
        assert_eq!(
            coordinator.store.get(EntityKind::Action, "a1").unwrap()["title"],
            json!("merged")
        );
    }

    #[tokio::test]
    async fn unknown_conflict_id_fails() {
        let coordinator = coordinator();
        let result = coordinator
            .resolve_conflict("missing", Resolution::Local, None)
            .await;
        assert!(matches!(result, Err(SyncError::UnknownConflict(_))));
    }

    #[tokio::test]
    async fn events_follow_the_cycle() {
        let coordinator = coordinator();
        let mut rx = coordinator.subscribe();

        coordinator.full_sync().await.unwrap();

        let mut saw_started = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SyncEvent::Started => saw_started = true,
                SyncEvent::Completed(_) => saw_completed = true,
                _ => {}
            }
        }
        assert!(saw_started);
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn state_is_persisted_and_rehydrated() {
        let device = DeviceInfo::new("d1", "Laptop", DeviceKind::Desktop, "linux");
        let config = SyncConfig::new("https://sync.tasknest.app", device);
        let store = Arc::new(MemoryStore::new());

        let coordinator = SyncCoordinator::new(
            config.clone(),
            Arc::new(MockTransport::new()),
            Arc::clone(&store),
        );
        coordinator.full_sync().await.unwrap();
        let success_time = coordinator.sync_state().last_success_time;
        assert!(success_time.is_some());

        // A new coordinator over the same store resumes the timestamps but
        // recomputes pending changes from the empty ledger.
        let revived =
            SyncCoordinator::new(config, Arc::new(MockTransport::new()), store);
        revived.initialize().await.unwrap();
        let state = revived.sync_state();
        assert_eq!(state.last_success_time, success_time);
        assert_eq!(state.pending_changes, 0);
        assert_eq!(state.status, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn initialize_registers_the_device() {
        let coordinator = coordinator();
        coordinator.initialize().await.unwrap();

        let devices = coordinator.transport.get_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "d1");
    }
}
