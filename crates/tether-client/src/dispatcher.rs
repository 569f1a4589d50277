//! Client-side correlation state shared by the caller-facing API and the
//! connection driver.
//!
//! Pending calls are keyed by `requestId`, subscriptions by `seq`. The
//! outbound sender belongs to the current connection and is `None` while
//! disconnected.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tether_core::disposable::panic_message;
use tether_core::protocol::method_for_channel;
use tether_core::{
    CallRequest, ClientFrame, ListenRequest, Notification, Response, UnlistenRequest,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::errors::ClientError;

/// Callback invoked with the params of every notification for a subscription.
pub type NotificationHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

type Waiter = oneshot::Sender<Result<Value, ClientError>>;

/// A registered subscription, replayed on every reconnect.
pub struct SubscriptionRecord {
    /// Client-unique sequence number.
    pub seq: u64,
    /// Target service.
    pub service_id: String,
    /// Method name without the subscribe prefix.
    pub channel: String,
    /// Application arguments.
    pub params: Vec<Value>,
    handler: NotificationHandler,
}

impl SubscriptionRecord {
    fn listen_frame(&self) -> ClientFrame {
        ClientFrame::Listen(ListenRequest {
            service_id: self.service_id.clone(),
            seq: self.seq,
            channel: self.channel.clone(),
            params: self.params.clone(),
        })
    }
}

/// Pending calls, subscriptions and the current outbound queue.
pub struct Dispatcher {
    next_request_id: AtomicU64,
    next_seq: AtomicU64,
    pending: Mutex<HashMap<u64, Waiter>>,
    subscriptions: Mutex<BTreeMap<u64, SubscriptionRecord>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    connection_id: Mutex<Option<String>>,
    connect_error: Mutex<Option<String>>,
}

impl Dispatcher {
    /// Empty dispatcher with no connection attached.
    pub fn new() -> Self {
        Self {
            next_request_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(BTreeMap::new()),
            outbound: Mutex::new(None),
            connection_id: Mutex::new(None),
            connect_error: Mutex::new(None),
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Queue a frame on the current connection.
    pub fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        let text = frame.to_json()?;
        self.send_text(text)
    }

    fn send_text(&self, text: String) -> Result<(), ClientError> {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(text).map_err(|_| ClientError::ConnectionLost),
            None => Err(ClientError::ConnectionLost),
        }
    }

    /// Whether a connection is attached.
    pub fn is_attached(&self) -> bool {
        self.outbound.lock().is_some()
    }

    /// Attach a new connection's outbound queue.
    ///
    /// Every registered subscription is queued as a listen frame first, in
    /// `seq` order. Returns how many were replayed.
    pub fn attach(&self, tx: mpsc::UnboundedSender<String>) -> usize {
        let subs = self.subscriptions.lock();
        let mut replayed = 0;
        for record in subs.values() {
            match record.listen_frame().to_json() {
                Ok(text) => {
                    if tx.send(text).is_ok() {
                        replayed += 1;
                    }
                }
                Err(e) => warn!(seq = record.seq, error = %e, "failed to encode listen frame"),
            }
        }
        *self.outbound.lock() = Some(tx);
        *self.connect_error.lock() = None;
        replayed
    }

    /// Detach the current connection and fail every pending call.
    ///
    /// Returns how many calls were failed.
    pub fn detach(&self, reason: fn() -> ClientError) -> usize {
        *self.outbound.lock() = None;
        *self.connection_id.lock() = None;
        let waiters: Vec<Waiter> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Err(reason()));
        }
        if count > 0 {
            debug!(count, "failed pending calls on detach");
        }
        count
    }

    /// Record the id the server assigned to this connection.
    pub fn set_connection_id(&self, id: String) {
        *self.connection_id.lock() = Some(id);
    }

    /// Server-assigned id of the current connection.
    pub fn connection_id(&self) -> Option<String> {
        self.connection_id.lock().clone()
    }

    /// Remember why the latest dial failed. Cleared by [`attach`](Self::attach).
    pub fn record_connect_error(&self, error: String) {
        *self.connect_error.lock() = Some(error);
    }

    /// Most recent dial failure since the last successful attach.
    pub fn connect_error(&self) -> Option<String> {
        self.connect_error.lock().clone()
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Allocate a `requestId` and register its waiter.
    pub fn register_call(self: &Arc<Self>) -> PendingCall {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(request_id, tx);
        PendingCall {
            request_id,
            rx,
            dispatcher: Arc::clone(self),
        }
    }

    /// Build and send a call frame for a registered waiter.
    pub fn send_call(
        &self,
        pending: &PendingCall,
        service_id: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<(), ClientError> {
        self.send(&ClientFrame::Call(CallRequest {
            request_id: pending.request_id,
            service_id: service_id.to_owned(),
            method: method.to_owned(),
            params,
        }))
    }

    /// Resolve the waiter for a response. Unknown ids are dropped.
    pub fn resolve(&self, response: Response) {
        let Some(waiter) = self.pending.lock().remove(&response.request_id) else {
            trace!(request_id = response.request_id, "response for unknown request");
            return;
        };
        let outcome = match response.error {
            Some(body) => Err(ClientError::from(body)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        let _ = waiter.send(outcome);
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register a subscription and send its listen frame when connected.
    ///
    /// While disconnected the record is only stored; it goes out with the
    /// replay on the next connect.
    pub fn subscribe(
        &self,
        service_id: &str,
        channel: &str,
        params: Vec<Value>,
        handler: NotificationHandler,
    ) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let record = SubscriptionRecord {
            seq,
            service_id: service_id.to_owned(),
            channel: channel.to_owned(),
            params,
            handler,
        };
        let frame = record.listen_frame();

        // held across the send so a concurrent attach cannot replay it twice
        let mut subs = self.subscriptions.lock();
        let _ = subs.insert(seq, record);
        if let Err(e) = self.send(&frame) {
            debug!(seq, error = %e, "listen deferred until reconnect");
        }
        seq
    }

    /// Forget a subscription and send an unlisten frame when connected.
    ///
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self, seq: u64) -> bool {
        let mut subs = self.subscriptions.lock();
        let Some(record) = subs.remove(&seq) else {
            return false;
        };
        let frame = ClientFrame::Unlisten(UnlistenRequest {
            service_id: record.service_id,
            seq,
        });
        if self.is_attached() {
            if let Err(e) = self.send(&frame) {
                debug!(seq, error = %e, "unlisten not sent");
            }
        }
        true
    }

    /// Route a notification to its handler. Unknown `seq` is dropped.
    ///
    /// A panicking handler is logged; the subscription stays registered.
    pub fn notify(&self, notification: Notification) {
        let handler = {
            let subs = self.subscriptions.lock();
            match subs.get(&notification.seq) {
                Some(record) => Arc::clone(&record.handler),
                None => {
                    trace!(seq = notification.seq, "notification for unknown subscription");
                    return;
                }
            }
        };
        let Notification {
            seq, method, params, ..
        } = notification;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(params))) {
            warn!(
                seq,
                method = %method,
                error = %panic_message(panic.as_ref()),
                "notification handler panicked"
            );
        }
    }

    /// Whether a subscription is registered.
    pub fn has_subscription(&self, seq: u64) -> bool {
        self.subscriptions.lock().contains_key(&seq)
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Subscribe-kind method name of a registered subscription.
    pub fn subscription_method(&self, seq: u64) -> Option<String> {
        self.subscriptions
            .lock()
            .get(&seq)
            .map(|r| method_for_channel(&r.channel))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiter for one call's response.
///
/// Dropping it removes the pending entry, so an abandoned call leaves nothing
/// behind.
pub struct PendingCall {
    request_id: u64,
    rx: oneshot::Receiver<Result<Value, ClientError>>,
    dispatcher: Arc<Dispatcher>,
}

impl PendingCall {
    /// Correlation id of this call.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait for the response.
    pub async fn wait(&mut self) -> Result<Value, ClientError> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::ConnectionLost),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let _ = self.dispatcher.pending.lock().remove(&self.request_id);
    }
}
