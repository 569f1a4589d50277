//! Body of `GET /health`.

use std::time::Instant;

use serde::Serialize;

/// Point-in-time view of the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"`, or `"draining"` once shutdown has started.
    pub status: &'static str,
    /// Whole seconds since the server was constructed.
    pub uptime_secs: u64,
    /// Open WebSocket sessions.
    pub connections: usize,
    /// Outbound frames discarded across open sessions.
    pub dropped_frames: u64,
    /// Hosted service ids, sorted.
    pub services: Vec<String>,
}

/// Live counters that feed a [`HealthResponse`].
#[derive(Debug, Default)]
pub struct HealthInputs {
    /// Open sessions.
    pub connections: usize,
    /// Dropped outbound frames.
    pub dropped_frames: u64,
    /// Hosted service ids.
    pub services: Vec<String>,
    /// Whether the stop token has fired.
    pub draining: bool,
}

/// Assemble the response for a server started at `started`.
pub fn health_check(started: Instant, inputs: HealthInputs) -> HealthResponse {
    HealthResponse {
        status: if inputs.draining { "draining" } else { "ok" },
        uptime_secs: started.elapsed().as_secs(),
        connections: inputs.connections,
        dropped_frames: inputs.dropped_frames,
        services: inputs.services,
    }
}
