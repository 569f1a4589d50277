//! Service method tables.
//!
//! A [`Service`] is an id plus an explicit table of methods, each declared
//! call-kind or subscribe-kind when the service is built. Subscribe-kind
//! handlers receive a [`NotifySink`] through which they push notifications.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::disposable::Disposable;
use crate::errors::ServiceError;
use crate::protocol::{self, Notification};

/// How a method is invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    /// Request/response.
    Call,
    /// Push stream established by `listen`.
    Subscribe,
}

/// Handler for a call-kind method.
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Run the method with positional params.
    async fn call(&self, params: Vec<Value>) -> Result<Value, ServiceError>;
}

/// Handler for a subscribe-kind method.
///
/// Runs inline on the connection's read task: start producers by spawning,
/// and return a [`Disposable`] that stops them.
pub trait SubscribeHandler: Send + Sync {
    /// Set up the subscription.
    fn subscribe(
        &self,
        params: Vec<Value>,
        sink: NotifySink,
    ) -> Result<Option<Disposable>, ServiceError>;
}

struct FnCall<F>(F);

#[async_trait]
impl<F, Fut> CallHandler for FnCall<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
{
    async fn call(&self, params: Vec<Value>) -> Result<Value, ServiceError> {
        (self.0)(params).await
    }
}

struct FnSubscribe<F>(F);

impl<F> SubscribeHandler for FnSubscribe<F>
where
    F: Fn(Vec<Value>, NotifySink) -> Result<Option<Disposable>, ServiceError> + Send + Sync,
{
    fn subscribe(
        &self,
        params: Vec<Value>,
        sink: NotifySink,
    ) -> Result<Option<Disposable>, ServiceError> {
        (self.0)(params, sink)
    }
}

#[derive(Clone)]
enum Method {
    Call(Arc<dyn CallHandler>),
    Subscribe(Arc<dyn SubscribeHandler>),
}

impl Method {
    fn kind(&self) -> MethodKind {
        match self {
            Self::Call(_) => MethodKind::Call,
            Self::Subscribe(_) => MethodKind::Subscribe,
        }
    }
}

/// A named object whose methods are exposed to clients.
pub struct Service {
    id: String,
    methods: HashMap<String, Method>,
}

impl Service {
    /// Start building a service.
    pub fn builder(id: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            id: id.into(),
            methods: HashMap::new(),
            error: None,
        }
    }

    /// Service id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Kind of a method, if the service has it.
    pub fn method(&self, name: &str) -> Option<MethodKind> {
        self.methods.get(name).map(Method::kind)
    }

    /// Handler for a call-kind method.
    pub fn call_handler(&self, name: &str) -> Option<Arc<dyn CallHandler>> {
        match self.methods.get(name)? {
            Method::Call(h) => Some(Arc::clone(h)),
            Method::Subscribe(_) => None,
        }
    }

    /// Handler for a subscribe-kind method.
    pub fn subscribe_handler(&self, name: &str) -> Option<Arc<dyn SubscribeHandler>> {
        match self.methods.get(name)? {
            Method::Subscribe(h) => Some(Arc::clone(h)),
            Method::Call(_) => None,
        }
    }

    /// Method names with their kinds, sorted by name.
    pub fn methods(&self) -> Vec<(String, MethodKind)> {
        let mut out: Vec<_> = self
            .methods
            .iter()
            .map(|(name, m)| (name.clone(), m.kind()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("methods", &self.methods())
            .finish()
    }
}

/// Rejected service declaration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Service id was empty.
    #[error("service id must not be empty")]
    EmptyId,
    /// Same method name declared twice.
    #[error("service '{service}' declares method '{method}' twice")]
    DuplicateMethod {
        /// Service id.
        service: String,
        /// Method name.
        method: String,
    },
    /// Call-kind method named like a subscription.
    #[error("call method '{service}.{method}' must not start with 'on'")]
    CallNameHasSubscribePrefix {
        /// Service id.
        service: String,
        /// Method name.
        method: String,
    },
    /// Subscribe-kind method lacks `on` plus a channel name.
    #[error("subscribe method '{service}.{method}' must be 'on' followed by a channel name")]
    SubscribeNameMissingPrefix {
        /// Service id.
        service: String,
        /// Method name.
        method: String,
    },
}

/// Declares the methods of a [`Service`].
pub struct ServiceBuilder {
    id: String,
    methods: HashMap<String, Method>,
    error: Option<BuildError>,
}

impl ServiceBuilder {
    /// Declare a call-kind method from an async closure.
    #[must_use]
    pub fn call<F, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
    {
        self.call_handler(name, FnCall(handler))
    }

    /// Declare a subscribe-kind method from a closure.
    #[must_use]
    pub fn subscribe<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>, NotifySink) -> Result<Option<Disposable>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        self.subscribe_handler(name, FnSubscribe(handler))
    }

    /// Declare a call-kind method from a handler value.
    #[must_use]
    pub fn call_handler(self, name: &str, handler: impl CallHandler + 'static) -> Self {
        if protocol::is_subscribe_method(name) {
            let err = BuildError::CallNameHasSubscribePrefix {
                service: self.id.clone(),
                method: name.to_owned(),
            };
            return self.fail(err);
        }
        self.insert(name, Method::Call(Arc::new(handler)))
    }

    /// Declare a subscribe-kind method from a handler value.
    #[must_use]
    pub fn subscribe_handler(self, name: &str, handler: impl SubscribeHandler + 'static) -> Self {
        if protocol::channel_of(name).is_none() {
            let err = BuildError::SubscribeNameMissingPrefix {
                service: self.id.clone(),
                method: name.to_owned(),
            };
            return self.fail(err);
        }
        self.insert(name, Method::Subscribe(Arc::new(handler)))
    }

    /// Finish the declaration. Reports the first rejected method.
    pub fn build(self) -> Result<Service, BuildError> {
        if self.id.is_empty() {
            return Err(BuildError::EmptyId);
        }
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Service {
            id: self.id,
            methods: self.methods,
        })
    }

    fn insert(mut self, name: &str, method: Method) -> Self {
        if self.methods.contains_key(name) {
            let err = BuildError::DuplicateMethod {
                service: self.id.clone(),
                method: name.to_owned(),
            };
            return self.fail(err);
        }
        let _ = self.methods.insert(name.to_owned(), method);
        self
    }

    fn fail(mut self, err: BuildError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }
}

// ── Push-callback ───────────────────────────────────────────────────

/// Destination of notifications (the server-side connection).
pub trait NotifyTarget: Send + Sync {
    /// Whether the connection can still carry frames.
    fn is_open(&self) -> bool;
    /// Queue a notification. Returns whether it was accepted.
    fn deliver(&self, notification: Notification) -> bool;
}

/// Push-callback handed to a subscribe-kind handler.
///
/// Bound to one connection and one subscription `seq`. Emits nothing once the
/// connection has closed or the subscription was released.
#[derive(Clone)]
pub struct NotifySink {
    target: Arc<dyn NotifyTarget>,
    seq: u64,
    service_id: Arc<str>,
    method: Arc<str>,
    retired: Arc<AtomicBool>,
}

impl NotifySink {
    /// Bind a sink to a connection and subscription.
    pub fn new(target: Arc<dyn NotifyTarget>, seq: u64, service_id: &str, method: &str) -> Self {
        Self {
            target,
            seq,
            service_id: service_id.into(),
            method: method.into(),
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push one value. An array is spread into the notification params.
    pub fn emit(&self, value: Value) -> bool {
        match value {
            Value::Array(params) => self.emit_params(params),
            other => self.emit_params(vec![other]),
        }
    }

    /// Push positional params verbatim.
    pub fn emit_params(&self, params: Vec<Value>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.target.deliver(Notification {
            seq: self.seq,
            service_id: self.service_id.to_string(),
            method: self.method.to_string(),
            params,
        })
    }

    /// Serialize and push one value.
    pub fn emit_serialized<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(v) => self.emit(v),
            Err(e) => {
                warn!(
                    service = %self.service_id,
                    method = %self.method,
                    seq = self.seq,
                    error = %e,
                    "notification not serializable"
                );
                false
            }
        }
    }

    /// Stop delivering through this sink and all its clones.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Whether pushes would currently be delivered.
    pub fn is_open(&self) -> bool {
        !self.retired.load(Ordering::Acquire) && self.target.is_open()
    }

    /// Subscription sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Service id the sink emits for.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Subscribe-kind method name the sink emits for.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Debug for NotifySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifySink")
            .field("seq", &self.seq)
            .field("service_id", &self.service_id)
            .field("method", &self.method)
            .field("open", &self.is_open())
            .finish()
    }
}
