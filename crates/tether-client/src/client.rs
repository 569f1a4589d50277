//! `RpcClient`: the caller-facing handle.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_core::protocol::{channel_of, is_subscribe_method};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::{ConnectionState, run_driver};
use crate::dispatcher::Dispatcher;
use crate::errors::ClientError;
use crate::proxy::ServiceProxy;
use crate::subscription::Subscription;

struct ClientInner {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Reconnecting RPC client over one WebSocket.
///
/// Cheap to clone; every clone shares the connection. The driver stops when
/// [`close`](Self::close) is called or the last clone is dropped.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Start the connection driver without waiting for it to connect.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let shutdown = CancellationToken::new();

        let driver = tokio::spawn(run_driver(
            Arc::clone(&dispatcher),
            config.clone(),
            state_tx,
            shutdown.clone(),
        ));

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                dispatcher,
                state: state_rx,
                shutdown,
                driver: Mutex::new(Some(driver)),
            }),
        })
    }

    /// Start the driver and wait for the first connection.
    ///
    /// Gives up after `connect_timeout_ms`: with [`ClientError::Transport`]
    /// when the last dial failed outright, otherwise [`ClientError::Timeout`].
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let timeout = config.connect_timeout();
        let timeout_ms = config.connect_timeout_ms;
        let client = Self::new(config)?;
        match tokio::time::timeout(timeout, client.wait_connected()).await {
            Ok(Ok(())) => Ok(client),
            Ok(Err(e)) => {
                client.close().await;
                Err(e)
            }
            Err(_) => {
                let dial_error = client.inner.dispatcher.connect_error();
                client.close().await;
                Err(match dial_error {
                    Some(message) => ClientError::Transport(message),
                    None => ClientError::Timeout {
                        operation: "connect".into(),
                        timeout_ms,
                    },
                })
            }
        }
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Server-assigned id of the current connection.
    pub fn connection_id(&self) -> Option<String> {
        self.inner.dispatcher.connection_id()
    }

    /// Wait until connected. Fails with [`ClientError::Closed`] once closed.
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        let mut rx = self.inner.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(ClientError::Closed),
                ConnectionState::Connecting | ConnectionState::Disconnected => {}
            }
            rx.changed().await.map_err(|_| ClientError::Closed)?;
        }
    }

    /// Invoke a call-kind method and wait for its result.
    ///
    /// Waits for a connection first. Fails once with
    /// [`ClientError::ConnectionLost`] if the connection drops in flight.
    pub async fn call(
        &self,
        service_id: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, ClientError> {
        if is_subscribe_method(method) {
            return Err(ClientError::ProtocolUsage(format!(
                "{service_id}.{method} is subscribe-kind; use subscribe"
            )));
        }
        let call = self.call_inner(service_id, method, params);
        self.with_request_timeout(service_id, method, call).await
    }

    /// [`call`](Self::call) and deserialize the result.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        service_id: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ClientError> {
        let value = self.call(service_id, method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_inner(
        &self,
        service_id: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, ClientError> {
        self.wait_connected().await?;
        let dispatcher = &self.inner.dispatcher;
        let mut pending = dispatcher.register_call();
        debug!(request_id = pending.request_id(), service = service_id, method, "call");
        dispatcher.send_call(&pending, service_id, method, params)?;
        pending.wait().await
    }

    async fn with_request_timeout(
        &self,
        service_id: &str,
        method: &str,
        call: impl Future<Output = Result<Value, ClientError>>,
    ) -> Result<Value, ClientError> {
        let Some(timeout) = self.inner.config.request_timeout() else {
            return call.await;
        };
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| ClientError::Timeout {
                operation: format!("{service_id}.{method}"),
                timeout_ms: self.inner.config.request_timeout_ms,
            })?
    }

    /// Register a subscription to a subscribe-kind method.
    ///
    /// The handler runs on the driver task for every notification, in arrival
    /// order. The subscription is replayed after every reconnect until
    /// disposed.
    pub fn subscribe(
        &self,
        service_id: &str,
        method: &str,
        params: Vec<Value>,
        handler: impl Fn(Vec<Value>) + Send + Sync + 'static,
    ) -> Result<Subscription, ClientError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let Some(channel) = channel_of(method) else {
            return Err(ClientError::ProtocolUsage(format!(
                "{service_id}.{method} is not a subscribe-kind method"
            )));
        };
        let dispatcher = &self.inner.dispatcher;
        let seq = dispatcher.subscribe(service_id, channel, params, Arc::new(handler));
        debug!(seq, service = service_id, method, "subscribed");
        Ok(Subscription::new(
            seq,
            service_id,
            channel,
            Arc::clone(dispatcher),
        ))
    }

    /// Dynamic proxy for a service.
    pub fn service(&self, service_id: &str) -> ServiceProxy {
        ServiceProxy::new(self.clone(), service_id)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.dispatcher.subscription_count()
    }

    /// Stop the driver and fail pending calls with [`ClientError::Closed`].
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let driver = self.inner.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.await;
            info!(endpoint = %self.inner.config.endpoint, "client closed");
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
