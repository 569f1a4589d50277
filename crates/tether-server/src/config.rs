//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_settings::ServerSettings;

use crate::errors::ServerError;

/// Configuration for the tether server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// HTTP path that upgrades to WebSocket.
    pub path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence before a connection is dropped, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Upper bound on one call-kind handler, in milliseconds.
    pub call_timeout_ms: u64,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/v1/channels".into(),
            max_connections: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            call_timeout_ms: 60_000,
            send_queue_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            path: settings.path.clone(),
            max_connections: settings.max_connections,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
            max_message_size: settings.max_message_size,
            call_timeout_ms: settings.call_timeout_ms,
            send_queue_capacity: settings.send_queue_capacity,
        }
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Liveness timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Call-kind handler timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// WebSocket path with a guaranteed leading `/`.
    pub fn ws_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    /// Reject configurations the router or session loop cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        let path = self.ws_path();
        if path == "/health" || path == "/" {
            return Err(ServerError::Config(format!("path '{path}' is reserved")));
        }
        if self.heartbeat_interval_ms == 0 || self.call_timeout_ms == 0 {
            return Err(ServerError::Config(
                "heartbeat interval and call timeout must be positive".into(),
            ));
        }
        if self.max_connections == 0 || self.send_queue_capacity == 0 {
            return Err(ServerError::Config(
                "max_connections and send_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
