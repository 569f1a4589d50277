//! WebSocket connection state, frame handling, heartbeat and the session loop.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
pub mod tracker;
