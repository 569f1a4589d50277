//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_settings::ClientSettings;

use crate::errors::ClientError;

/// Configuration for [`RpcClient`](crate::RpcClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub endpoint: String,
    /// How long `connect` waits for the first connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-call response timeout in milliseconds; 0 disables it.
    pub request_timeout_ms: u64,
    /// First reconnect delay in milliseconds.
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling in milliseconds.
    pub reconnect_max_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

impl ClientConfig {
    /// Config for an endpoint with default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Derive from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            connect_timeout_ms: settings.connect_timeout_ms,
            request_timeout_ms: settings.request_timeout_ms,
            reconnect_initial_ms: settings.reconnect_initial_ms,
            reconnect_max_ms: settings.reconnect_max_ms,
        }
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-call timeout, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// First reconnect delay.
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms.max(1))
    }

    /// Reconnect delay ceiling.
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms).max(1))
    }

    /// Reject endpoints that are not WebSocket URLs.
    pub fn validate(&self) -> Result<(), ClientError> {
        let rest = self
            .endpoint
            .strip_prefix("ws://")
            .or_else(|| self.endpoint.strip_prefix("wss://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
            _ => Err(ClientError::InvalidEndpoint(self.endpoint.clone())),
        }
    }
}
