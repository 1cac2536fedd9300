//! Transport layer abstraction for sync operations.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tasknest_sync_protocol::{
    ConflictRecord, DeviceInfo, FullSyncRequest, PushRequest, ResolveConflictRequest, SyncEnvelope,
};

/// A sync transport handles communication with the remote counterpart.
///
/// This trait abstracts the network layer, allowing different
/// implementations (HTTP, simulated in-memory, mock for testing). All
/// operations are asynchronous and may fail with a transport error; the
/// coordinator treats any failure as a sync-cycle failure.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Prepares the transport for use.
    async fn initialize(&self, config: &SyncConfig) -> SyncResult<()>;

    /// Runs a combined push/pull cycle on the remote.
    async fn full_sync(&self, request: FullSyncRequest) -> SyncResult<SyncEnvelope>;

    /// Pulls changes committed since `since` for an incremental cycle.
    async fn incremental_sync(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> SyncResult<SyncEnvelope>;

    /// Pushes a batch of buffered local changes.
    async fn push_changes(&self, request: PushRequest) -> SyncResult<SyncEnvelope>;

    /// Pulls remote changes since the given time.
    async fn pull_changes(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<SyncEnvelope>;

    /// Registers a device in the remote registry.
    async fn register_device(&self, device: DeviceInfo) -> SyncResult<()>;

    /// Updates a registered device (name, activity, last seen).
    async fn update_device(&self, device: DeviceInfo) -> SyncResult<()>;

    /// Lists registered devices.
    async fn get_devices(&self) -> SyncResult<Vec<DeviceInfo>>;

    /// Reports a conflict resolution so the remote converges too.
    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        request: ResolveConflictRequest,
    ) -> SyncResult<()>;

    /// Lists conflicts the remote knows about.
    async fn get_conflicts(&self) -> SyncResult<Vec<ConflictRecord>>;

    /// Checks remote reachability.
    async fn check_connection(&self) -> SyncResult<bool>;
}

/// A mock transport with scripted responses and call counters.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    fail_with: Mutex<Option<String>>,
    push_response: Mutex<Option<SyncEnvelope>>,
    pull_response: Mutex<Option<SyncEnvelope>>,
    incremental_response: Mutex<Option<SyncEnvelope>>,
    devices: RwLock<Vec<DeviceInfo>>,
    resolutions: RwLock<Vec<(String, ResolveConflictRequest)>>,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    incremental_calls: AtomicUsize,
}

impl MockTransport {
    /// Creates a connected mock with empty successful responses.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Scripts the next push response.
    pub fn set_push_response(&self, response: SyncEnvelope) {
        *self.push_response.lock() = Some(response);
    }

    /// Scripts the next pull response.
    pub fn set_pull_response(&self, response: SyncEnvelope) {
        *self.pull_response.lock() = Some(response);
    }

    /// Scripts the next incremental response.
    pub fn set_incremental_response(&self, response: SyncEnvelope) {
        *self.incremental_response.lock() = Some(response);
    }

    /// Makes every subsequent operation fail with a retryable transport
    /// error carrying `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock() = Some(message.into());
    }

    /// Clears a previously injected failure.
    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
    }

    /// Sets the connected flag.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of push calls observed.
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    /// Number of pull calls observed.
    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Number of incremental calls observed.
    pub fn incremental_calls(&self) -> usize {
        self.incremental_calls.load(Ordering::SeqCst)
    }

    /// Resolutions reported through the transport.
    pub fn resolutions(&self) -> Vec<(String, ResolveConflictRequest)> {
        self.resolutions.read().clone()
    }

    fn check_failure(&self) -> SyncResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn initialize(&self, _config: &SyncConfig) -> SyncResult<()> {
        self.check_failure()
    }

    async fn full_sync(&self, _request: FullSyncRequest) -> SyncResult<SyncEnvelope> {
        self.check_failure()?;
        Ok(SyncEnvelope::ok())
    }

    async fn incremental_sync(
        &self,
        _device_id: &str,
        _since: DateTime<Utc>,
    ) -> SyncResult<SyncEnvelope> {
        self.incremental_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .incremental_response
            .lock()
            .clone()
            .unwrap_or_else(SyncEnvelope::ok))
    }

    async fn push_changes(&self, _request: PushRequest) -> SyncResult<SyncEnvelope> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .push_response
            .lock()
            .clone()
            .unwrap_or_else(SyncEnvelope::ok))
    }

    async fn pull_changes(
        &self,
        _device_id: &str,
        _since: Option<DateTime<Utc>>,
    ) -> SyncResult<SyncEnvelope> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .pull_response
            .lock()
            .clone()
            .unwrap_or_else(SyncEnvelope::ok))
    }

    async fn register_device(&self, device: DeviceInfo) -> SyncResult<()> {
        self.check_failure()?;
        let mut devices = self.devices.write();
        devices.retain(|d| d.id != device.id);
        devices.push(device);
        Ok(())
    }

    async fn update_device(&self, device: DeviceInfo) -> SyncResult<()> {
        self.check_failure()?;
        let mut devices = self.devices.write();
        if let Some(existing) = devices.iter_mut().find(|d| d.id == device.id) {
            *existing = device;
        }
        Ok(())
    }

    async fn get_devices(&self) -> SyncResult<Vec<DeviceInfo>> {
        self.check_failure()?;
        Ok(self.devices.read().clone())
    }

    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        request: ResolveConflictRequest,
    ) -> SyncResult<()> {
        self.check_failure()?;
        self.resolutions
            .write()
            .push((conflict_id.to_string(), request));
        Ok(())
    }

    async fn get_conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        self.check_failure()?;
        Ok(Vec::new())
    }

    async fn check_connection(&self) -> SyncResult<bool> {
        Ok(self.connected.load(Ordering::SeqCst))
    }
}
