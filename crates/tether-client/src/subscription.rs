//! Caller-side handle of one subscription.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dispatcher::Dispatcher;

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the subscription alive for the client's
/// lifetime; call [`Subscription::dispose`] to end it.
pub struct Subscription {
    seq: u64,
    service_id: String,
    channel: String,
    dispatcher: Arc<Dispatcher>,
    disposed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        seq: u64,
        service_id: &str,
        channel: &str,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            seq,
            service_id: service_id.to_owned(),
            channel: channel.to_owned(),
            dispatcher,
            disposed: AtomicBool::new(false),
        }
    }

    /// Client-unique sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Service this subscription listens to.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Channel name (method without the `on` prefix).
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether `dispose` has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop delivery and tell the server to release its handle.
    ///
    /// Idempotent. While disconnected only the local record is removed, so
    /// the subscription is not replayed on reconnect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.dispatcher.unsubscribe(self.seq);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("seq", &self.seq)
            .field("service_id", &self.service_id)
            .field("channel", &self.channel)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    #[test]
    fn dispose_is_idempotent() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _ = dispatcher.attach(tx);
        let seq = dispatcher.subscribe("store", "Change", vec![], Arc::new(|_: Vec<Value>| {}));
        let _ = rx.try_recv().unwrap();

        let sub = Subscription::new(seq, "store", "Change", Arc::clone(&dispatcher));
        sub.dispose();
        sub.dispose();
        assert!(sub.is_disposed());
        assert!(!dispatcher.has_subscription(seq));
        assert!(rx.try_recv().unwrap().contains("unlisten"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dispose_while_disconnected_only_forgets() {
        let dispatcher = Arc::new(Dispatcher::new());
        let seq = dispatcher.subscribe("store", "Change", vec![], Arc::new(|_: Vec<Value>| {}));
        let sub = Subscription::new(seq, "store", "Change", Arc::clone(&dispatcher));
        sub.dispose();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(dispatcher.attach(tx), 0);
        assert!(rx.try_recv().is_err());
    }
}
