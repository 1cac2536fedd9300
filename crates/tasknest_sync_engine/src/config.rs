//! Configuration for the sync coordinator.

use std::time::Duration;
use tasknest_sync_protocol::DeviceInfo;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote server URL.
    pub server_url: String,
    /// Bearer token for the remote, if authentication is configured.
    pub auth_token: Option<String>,
    /// This device's registry entry.
    pub device: DeviceInfo,
    /// Interval between auto-sync ticks.
    pub sync_interval: Duration,
    /// Whether auto-sync starts enabled.
    pub auto_sync: bool,
    /// Request timeout hint for transports.
    pub timeout: Duration,
    /// Backoff applied to the auto-sync loop after failed ticks.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>, device: DeviceInfo) -> Self {
        Self {
            server_url: server_url.into(),
            auth_token: None,
            device,
            sync_interval: Duration::from_secs(300),
            auto_sync: false,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the auto-sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Enables auto-sync from construction.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Sets the request timeout hint.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the auto-sync backoff configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Backoff schedule for the auto-sync loop.
///
/// Manual syncs are never retried automatically; this schedule only
/// stretches the delay between auto-sync ticks after consecutive failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay added after the first failed tick.
    pub initial_delay: Duration,
    /// Upper bound on the added delay.
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new backoff configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Disables backoff entirely.
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns the delay to add after `consecutive_failures` failed ticks.
    pub fn delay_for_failures(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(consecutive_failures.saturating_sub(1) as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}
