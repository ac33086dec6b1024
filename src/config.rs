//! Sync layer configuration

use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Configuration for the order synchronization layer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Push channel endpoint (e.g., "ws://localhost:8080/socket")
    pub ws_url: String,

    /// REST base URL for the order-listing collaborator
    pub api_base_url: String,

    /// HTTP request timeout for the polling path
    pub request_timeout: Duration,

    /// Polling fallback tick interval
    pub poll_interval: Duration,

    /// Page size for polling fetches (first page only)
    pub poll_page_size: u32,

    /// Reconnect backoff policy for the push channel
    pub reconnect: ReconnectPolicy,
}

impl SyncConfig {
    pub fn new(ws_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_base_url: api_base_url.into(),
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(5000),
            poll_page_size: 10,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Set the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the polling page size
    pub fn with_poll_page_size(mut self, size: u32) -> Self {
        self.poll_page_size = size;
        self
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the full reconnect policy
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the maximum number of automatic reconnect attempts
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("ws://localhost:8080/socket", "http://localhost:8080/api")
    }
}
