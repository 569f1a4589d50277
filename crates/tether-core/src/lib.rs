//! # tether-core
//!
//! Shared building blocks for the tether RPC layer.
//!
//! - [`protocol`]: JSON wire frames exchanged over the WebSocket (`call`,
//!   `response`, `listen`, `unlisten`, `notify`, `established`)
//! - [`errors`]: error codes, the server-side [`RpcError`] taxonomy and the
//!   [`ServiceError`] type service methods fail with
//! - [`disposable`]: idempotent release handles and the ordered collection
//!   that releases them in reverse on disconnect
//! - [`service`]: explicit per-service method tables (call-kind vs
//!   subscribe-kind) and the [`NotifySink`] push-callback
//! - [`logging`]: `tracing` subscriber setup shared by the binaries

#![deny(unsafe_code)]

pub mod disposable;
pub mod errors;
pub mod logging;
pub mod protocol;
pub mod service;

pub use disposable::{Disposable, DisposableCollection, DisposeError};
pub use errors::{RpcError, ServiceError};
pub use protocol::{
    CallRequest, ClientFrame, ErrorBody, ListenRequest, Notification, Response, ServerFrame,
    UnlistenRequest,
};
pub use service::{
    BuildError, CallHandler, MethodKind, NotifySink, NotifyTarget, Service, ServiceBuilder,
    SubscribeHandler,
};
