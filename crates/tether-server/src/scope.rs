//! Per-connection subscription state.
//!
//! Owned by the session task, so no locking. Closing the scope stops every
//! sink bound to the connection and then releases the disposal collection in
//! reverse order.

use std::collections::HashMap;
use std::sync::Arc;

use tether_core::{Disposable, DisposableCollection, NotifySink};
use tracing::{debug, warn};

use crate::websocket::connection::ClientConnection;

/// Identity of one subscription on one connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Service id.
    pub service_id: String,
    /// Channel (method name without the `on` prefix).
    pub channel: String,
    /// Client sequence number.
    pub seq: u64,
}

struct ActiveSubscription {
    sink: NotifySink,
    handle: Option<Arc<Disposable>>,
}

/// Subscriptions and release handles owned by one connection.
pub struct ConnectionScope {
    connection: Arc<ClientConnection>,
    active: HashMap<SubscriptionKey, ActiveSubscription>,
    disposables: DisposableCollection,
    closed: bool,
}

impl ConnectionScope {
    /// Empty scope for a connection.
    pub fn new(connection: Arc<ClientConnection>) -> Self {
        Self {
            connection,
            active: HashMap::new(),
            disposables: DisposableCollection::new(),
            closed: false,
        }
    }

    /// The connection this scope belongs to.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// Whether a subscription is already active.
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.active.contains_key(key)
    }

    /// Record an established subscription and its optional release handle.
    pub fn insert(&mut self, key: SubscriptionKey, sink: NotifySink, handle: Option<Disposable>) {
        let handle = handle.map(|h| self.disposables.push(h));
        let _ = self.active.insert(key, ActiveSubscription { sink, handle });
    }

    /// Release one subscription by service and seq.
    ///
    /// Returns whether a subscription was found.
    pub fn release(&mut self, service_id: &str, seq: u64) -> bool {
        let Some(key) = self
            .active
            .keys()
            .find(|k| k.seq == seq && k.service_id == service_id)
            .cloned()
        else {
            return false;
        };
        let Some(entry) = self.active.remove(&key) else {
            return false;
        };
        entry.sink.retire();
        if let Some(handle) = entry.handle {
            let _ = self.disposables.remove(&handle);
            if let Err(err) = handle.dispose() {
                warn!(
                    conn_id = %self.connection.id,
                    label = %err.label,
                    error = %err.message,
                    "dispose failed"
                );
            }
        }
        debug!(
            conn_id = %self.connection.id,
            service = %key.service_id,
            channel = %key.channel,
            seq,
            "subscription released"
        );
        true
    }

    /// Number of active subscriptions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of held release handles.
    pub fn disposable_count(&self) -> usize {
        self.disposables.len()
    }

    /// Whether the scope has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the connection and release everything. Idempotent.
    ///
    /// Returns the number of release handles that failed.
    pub fn close(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;
        self.connection.close();
        for entry in self.active.values() {
            entry.sink.retire();
        }
        let count = self.active.len();
        self.active.clear();
        let failures = self.disposables.dispose();
        debug!(
            conn_id = %self.connection.id,
            subscriptions = count,
            failed = failures.len(),
            "connection scope closed"
        );
        failures.len()
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
