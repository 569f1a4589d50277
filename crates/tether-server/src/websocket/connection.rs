//! Per-session outbound handle.
//!
//! A [`ClientConnection`] is what handlers, the router and every
//! subscription sink hold on to. It never touches the socket: frames go onto
//! a bounded queue drained by the session's writer task. A full queue drops
//! notifications instead of stalling the producer; responses wait for room.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tether_core::{Notification, NotifyTarget, Response, ServerFrame};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

/// Outbound side of one WebSocket session.
pub struct ClientConnection {
    /// `conn_<uuid>` assigned at upgrade.
    pub id: String,
    outbound: mpsc::Sender<String>,
    opened: Instant,
    heard_from: AtomicBool,
    dropped: AtomicU64,
    accepting: AtomicBool,
}

impl ClientConnection {
    /// Wrap the writer queue of a freshly upgraded session.
    pub fn new(id: String, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            outbound,
            opened: Instant::now(),
            heard_from: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
        }
    }

    /// Enqueue raw text. `false` when the session is closing or the queue
    /// cannot take it; queue failures are counted.
    pub fn send(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.outbound.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                let full = matches!(e, TrySendError::Full(_));
                trace!(conn_id = %self.id, dropped, full, "outbound frame dropped");
                false
            }
        }
    }

    /// Encode and enqueue a server frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        self.encode(frame).is_some_and(|text| self.send(text))
    }

    /// Enqueue a response, waiting for queue room instead of dropping it.
    ///
    /// Resolves `false` only once the session is closing or its writer has
    /// stopped. Waiters are served before later `try_send` callers, so a
    /// saturating notification feed cannot starve a response.
    pub async fn send_response(&self, response: Response) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(text) = self.encode(&ServerFrame::Response(response)) else {
            return false;
        };
        self.outbound.send(text).await.is_ok()
    }

    /// [`send_response`](Self::send_response) for synchronous callers.
    ///
    /// Enqueues immediately when there is room; otherwise the wait moves to a
    /// spawned task. Returns `false` when the session is already gone.
    pub fn queue_response(&self, response: Response) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(text) = self.encode(&ServerFrame::Response(response)) else {
            return false;
        };
        match self.outbound.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(text)) => {
                let outbound = self.outbound.clone();
                let conn_id = self.id.clone();
                drop(tokio::spawn(async move {
                    if outbound.send(text).await.is_err() {
                        debug!(conn_id, "session ended before response was queued");
                    }
                }));
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn encode(&self, frame: &ServerFrame) -> Option<String> {
        frame
            .to_json()
            .inspect_err(|e| warn!(conn_id = %self.id, error = %e, "server frame not encodable"))
            .ok()
    }

    /// Frames this session has discarded so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record inbound traffic for the heartbeat.
    pub fn mark_alive(&self) {
        self.heard_from.store(true, Ordering::Relaxed);
    }

    /// Read and clear the traffic mark.
    pub fn check_alive(&self) -> bool {
        self.heard_from.swap(false, Ordering::Relaxed)
    }

    /// Refuse all further frames. Idempotent.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// `false` once [`close`](Self::close) ran.
    pub fn is_open(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Time since upgrade.
    pub fn age(&self) -> Duration {
        self.opened.elapsed()
    }
}

impl NotifyTarget for ClientConnection {
    fn is_open(&self) -> bool {
        ClientConnection::is_open(self)
    }

    fn deliver(&self, notification: Notification) -> bool {
        self.send_frame(&ServerFrame::Notify(notification))
    }
}
