//! Dynamic service proxy.
//!
//! Method names are classified by the `on` prefix: `onPriceChange` is
//! subscribe-kind, anything else is call-kind.

use std::sync::Arc;

use serde_json::Value;
use tether_core::protocol::{channel_of, is_subscribe_method};

use crate::client::RpcClient;
use crate::errors::ClientError;
use crate::subscription::Subscription;

/// Read-only handle to one remote service.
#[derive(Clone, Debug)]
pub struct ServiceProxy {
    client: RpcClient,
    id: Arc<str>,
}

/// A method looked up on a proxy, already classified.
#[derive(Clone, Copy, Debug)]
pub enum ProxyMethod<'a> {
    /// Request/response method.
    Call(CallMethod<'a>),
    /// Notification stream method.
    Subscribe(SubscribeMethod<'a>),
}

/// Call-kind method bound to a proxy.
#[derive(Clone, Copy, Debug)]
pub struct CallMethod<'a> {
    proxy: &'a ServiceProxy,
    name: &'a str,
}

/// Subscribe-kind method bound to a proxy.
#[derive(Clone, Copy, Debug)]
pub struct SubscribeMethod<'a> {
    proxy: &'a ServiceProxy,
    name: &'a str,
}

impl ServiceProxy {
    pub(crate) fn new(client: RpcClient, id: &str) -> Self {
        Self {
            client,
            id: Arc::from(id),
        }
    }

    /// Service id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Client this proxy sends through.
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Look up a method by name.
    pub fn method<'a>(&'a self, name: &'a str) -> ProxyMethod<'a> {
        if is_subscribe_method(name) {
            ProxyMethod::Subscribe(SubscribeMethod { proxy: self, name })
        } else {
            ProxyMethod::Call(CallMethod { proxy: self, name })
        }
    }

    /// Invoke a call-kind method.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        self.client.call(&self.id, method, params).await
    }

    /// Subscribe to a subscribe-kind method.
    pub fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        handler: impl Fn(Vec<Value>) + Send + Sync + 'static,
    ) -> Result<Subscription, ClientError> {
        self.client.subscribe(&self.id, method, params, handler)
    }
}

impl ProxyMethod<'_> {
    /// Wire method name.
    pub fn name(&self) -> &str {
        match self {
            Self::Call(m) => m.name,
            Self::Subscribe(m) => m.name,
        }
    }

    /// Whether this is subscribe-kind.
    pub fn is_subscribe(&self) -> bool {
        matches!(self, Self::Subscribe(_))
    }
}

impl CallMethod<'_> {
    /// Wire method name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Send the call and wait for its result.
    pub async fn invoke(&self, params: Vec<Value>) -> Result<Value, ClientError> {
        self.proxy.call(self.name, params).await
    }
}

impl SubscribeMethod<'_> {
    /// Wire method name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Channel name; `None` for the bare prefix.
    pub fn channel(&self) -> Option<&str> {
        channel_of(self.name)
    }

    /// Register a subscription.
    pub fn listen(
        &self,
        params: Vec<Value>,
        handler: impl Fn(Vec<Value>) + Send + Sync + 'static,
    ) -> Result<Subscription, ClientError> {
        self.proxy.subscribe(self.name, params, handler)
    }
}
