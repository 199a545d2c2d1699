//! Sync client configuration.

use std::time::Duration;

use convoy_schemas::DeviceRole;
use serde::{Deserialize, Serialize};

use crate::backoff::ReconnectPolicy;

/// Connection settings for the sync client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncClientConfig {
    /// Relay address, `ws://`, `wss://`, `http://`, `https://` or bare `host:port`.
    pub server_url: String,
    /// Role to ask the relay for. The relay may assign a different one.
    pub requested_role: Option<DeviceRole>,
    /// First reconnect delay, in milliseconds.
    pub reconnect_base_ms: u64,
    /// Largest reconnect delay, in milliseconds.
    pub reconnect_cap_ms: u64,
    /// Failed attempts before polling takes over.
    pub max_reconnect_attempts: u32,
    /// Poll interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Socket connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// HTTP request timeout, in milliseconds.
    pub http_timeout_ms: u64,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3001".to_string(),
            requested_role: None,
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 30_000,
            max_reconnect_attempts: 10,
            poll_interval_ms: 2000,
            connect_timeout_ms: 10_000,
            http_timeout_ms: 5000,
        }
    }
}

impl SyncClientConfig {
    /// Defaults pointed at `server_url`.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// WebSocket endpoint of the relay.
    pub fn ws_url(&self) -> String {
        let url = self.server_url.trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if url.starts_with("ws://") || url.starts_with("wss://") {
            url.to_string()
        } else {
            format!("ws://{url}")
        }
    }

    /// Base URL for the HTTP submission and polling endpoints.
    pub fn http_base_url(&self) -> String {
        let url = self.server_url.trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else if let Some(rest) = url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        }
    }

    /// Reconnect policy derived from these settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            cap: Duration::from_millis(self.reconnect_cap_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// Interval between polls once polling takes over.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Timeout for opening the socket.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Timeout for one HTTP request.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}
