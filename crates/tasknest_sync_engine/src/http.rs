//! HTTP transport implementation.
//!
//! This module maps the transport trait onto the sync server's HTTP routes.
//! The actual HTTP client is abstracted via a trait so different libraries
//! (reqwest, hyper, ureq, a platform webview bridge) can provide the
//! network mechanics.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tasknest_sync_protocol::{
    ConflictRecord, DeviceInfo, FullSyncRequest, PushRequest, ResolveConflictRequest, SyncEnvelope,
};

/// HTTP method for a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request.
    Get,
    /// POST request.
    Post,
    /// PATCH request.
    Patch,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual network mechanics. Requests
/// and responses are JSON bodies; `bearer` carries the token for the
/// `Authorization` header when auth is configured.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response body.
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        bearer: Option<&str>,
        body: Option<String>,
    ) -> Result<String, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-backed sync transport speaking JSON.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    auth_token: RwLock<Option<String>>,
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            auth_token: RwLock::new(None),
            connected: AtomicBool::new(true),
            last_error: Mutex::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.lock() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    async fn send_json<Req, Res>(
        &self,
        method: HttpMethod,
        path: &str,
        request: Option<&Req>,
    ) -> SyncResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        if !self.connected.load(Ordering::SeqCst) || !self.client.is_healthy() {
            return Err(SyncError::NotConnected);
        }

        let body = match request {
            Some(req) => Some(serde_json::to_string(req)?),
            None => None,
        };

        let url = format!("{}{}", self.base_url, path);
        let token = self.auth_token.read().clone();
        let response = self
            .client
            .send(method, &url, token.as_deref(), body)
            .await
            .map_err(|e| {
                self.set_error(&e);
                self.connected.store(false, Ordering::SeqCst);
                SyncError::transport_retryable(e)
            })?;

        self.clear_error();

        serde_json::from_str(&response)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }

    /// Fails the call when the remote reported an unsuccessful envelope.
    fn check_envelope(envelope: SyncEnvelope) -> SyncResult<SyncEnvelope> {
        if envelope.success {
            Ok(envelope)
        } else {
            Err(SyncError::transport_fatal(
                envelope.error.unwrap_or_else(|| "remote rejected request".into()),
            ))
        }
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn initialize(&self, config: &SyncConfig) -> SyncResult<()> {
        *self.auth_token.write() = config.auth_token.clone();
        self.connected.store(true, Ordering::SeqCst);

        let envelope: SyncEnvelope = self
            .send_json::<(), _>(HttpMethod::Get, "/health", None)
            .await?;
        Self::check_envelope(envelope).map(|_| ())
    }

    async fn full_sync(&self, request: FullSyncRequest) -> SyncResult<SyncEnvelope> {
        let envelope = self
            .send_json(HttpMethod::Post, "/sync/full", Some(&request))
            .await?;
        Self::check_envelope(envelope)
    }

    async fn incremental_sync(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> SyncResult<SyncEnvelope> {
        let path = format!(
            "/sync/incremental?device_id={device_id}&since_ms={}",
            since.timestamp_millis()
        );
        let envelope = self.send_json::<(), _>(HttpMethod::Get, &path, None).await?;
        Self::check_envelope(envelope)
    }

    async fn push_changes(&self, request: PushRequest) -> SyncResult<SyncEnvelope> {
        let envelope = self
            .send_json(HttpMethod::Post, "/sync/push", Some(&request))
            .await?;
        Self::check_envelope(envelope)
    }

    async fn pull_changes(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<SyncEnvelope> {
        let path = match since {
            Some(since) => format!(
                "/sync/pull?device_id={device_id}&since_ms={}",
                since.timestamp_millis()
            ),
            None => format!("/sync/pull?device_id={device_id}"),
        };
        let envelope = self.send_json::<(), _>(HttpMethod::Get, &path, None).await?;
        Self::check_envelope(envelope)
    }

    async fn register_device(&self, device: DeviceInfo) -> SyncResult<()> {
        let envelope: SyncEnvelope = self
            .send_json(HttpMethod::Post, "/devices", Some(&device))
            .await?;
        Self::check_envelope(envelope).map(|_| ())
    }

    async fn update_device(&self, device: DeviceInfo) -> SyncResult<()> {
        let path = format!("/devices/{}", device.id);
        let envelope: SyncEnvelope = self
            .send_json(HttpMethod::Patch, &path, Some(&device))
            .await?;
        Self::check_envelope(envelope).map(|_| ())
    }

    async fn get_devices(&self) -> SyncResult<Vec<DeviceInfo>> {
        self.send_json::<(), _>(HttpMethod::Get, "/devices", None)
            .await
    }

    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        request: ResolveConflictRequest,
    ) -> SyncResult<()> {
        let path = format!("/conflicts/{conflict_id}/resolve");
        let envelope: SyncEnvelope = self
            .send_json(HttpMethod::Post, &path, Some(&request))
            .await?;
        Self::check_envelope(envelope).map(|_| ())
    }

    async fn get_conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        self.send_json::<(), _>(HttpMethod::Get, "/conflicts", None)
            .await
    }

    async fn check_connection(&self) -> SyncResult<bool> {
        if !self.client.is_healthy() {
            return Ok(false);
        }
        let result: SyncResult<SyncEnvelope> =
            self.send_json::<(), _>(HttpMethod::Get, "/health", None).await;
        Ok(matches!(result, Ok(envelope) if envelope.success))
    }
}
