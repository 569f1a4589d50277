//! Server listener, liveness and limit settings.

use serde::{Deserialize, Serialize};

/// Server network and runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// HTTP path that upgrades to the WebSocket transport.
    pub path: String,
    /// Maximum concurrent connections; extra upgrades get 503.
    pub max_connections: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is dropped, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted frame in bytes.
    pub max_message_size: usize,
    /// Upper bound on one call-kind handler, in milliseconds.
    pub call_timeout_ms: u64,
    /// Outbound frames buffered per connection before drops.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            path: "/v1/channels".to_string(),
            max_connections: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 16 * 1024 * 1024,
            call_timeout_ms: 60_000,
            send_queue_capacity: 1024,
        }
    }
}
