//! # tether-server
//!
//! Axum WebSocket server hosting tether services.
//!
//! - [`registry`]: services by id, built before startup and shared read-only
//! - [`router`]: call frames → call-kind handlers → response frames
//! - [`subscriptions`]: listen/unlisten frames → subscribe-kind handlers
//! - [`scope`]: per-connection subscription index and disposal collection
//! - [`websocket`]: connection state, frame handling, heartbeat, session loop
//! - [`server`]: HTTP routes (`{path}` upgrade, `/health`) and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod registry;
pub mod router;
pub mod scope;
pub mod server;
pub mod shutdown;
pub mod subscriptions;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use registry::ServiceRegistry;
pub use server::TetherServer;
pub use shutdown::ShutdownCoordinator;
