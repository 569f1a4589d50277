//! Client connection and reconnect settings.

use serde::{Deserialize, Serialize};

/// Client connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket URL of the server.
    pub endpoint: String,
    /// How long `connect` waits for the first connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-call response timeout in milliseconds; 0 waits indefinitely.
    pub request_timeout_ms: u64,
    /// First reconnect delay in milliseconds.
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling in milliseconds.
    pub reconnect_max_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:3001/v1/channels".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 0,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}
