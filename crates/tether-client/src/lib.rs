//! # tether-client
//!
//! Reconnecting client for tether servers.
//!
//! - [`client`]: [`RpcClient`], calls with `requestId` correlation and
//!   subscriptions keyed by `seq`
//! - [`connection`]: the driver task that owns the WebSocket, reconnects with
//!   backoff and replays subscriptions
//! - [`dispatcher`]: pending-call and subscription tables shared with the driver
//! - [`proxy`]: [`ServiceProxy`], name-classified dynamic access to a service
//! - [`stub`]: [`service_stub!`] for typed per-service clients

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod proxy;
pub mod stub;
pub mod subscription;

pub use client::RpcClient;
pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use errors::ClientError;
pub use proxy::{CallMethod, ProxyMethod, ServiceProxy, SubscribeMethod};
pub use subscription::Subscription;

#[doc(hidden)]
pub use stub::__private;
