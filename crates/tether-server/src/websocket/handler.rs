//! Inbound frame dispatch for one connection.
//!
//! Parses text as a [`ClientFrame`] and routes it: calls to the router,
//! listen/unlisten to the subscription manager.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_core::{ClientFrame, Response, RpcError};
use tracing::{debug, instrument, warn};

use crate::registry::ServiceRegistry;
use crate::router::{self, CallDispatch};
use crate::scope::ConnectionScope;
use crate::subscriptions::{self, ListenOutcome};

use super::connection::ClientConnection;

/// What a single inbound frame led to.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Call routed (answered now or running on its own task).
    Call(CallDispatch),
    /// Listen handled.
    Listen(ListenOutcome),
    /// Unlisten handled; `true` when a subscription was released.
    Unlisten(bool),
    /// Unparseable frame answered with a parse error.
    ParseErrorSent,
    /// Unparseable frame with no recoverable request id.
    Dropped,
}

/// Frame handler owning one connection's scope.
pub struct FrameHandler {
    registry: Arc<ServiceRegistry>,
    scope: ConnectionScope,
    call_timeout: Duration,
}

impl FrameHandler {
    /// Create a handler for a connection.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        connection: Arc<ClientConnection>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            scope: ConnectionScope::new(connection),
            call_timeout,
        }
    }

    /// Handle one inbound text frame.
    #[instrument(skip_all, fields(conn_id = %self.scope.connection().id, frame_type))]
    pub fn handle_text(&mut self, text: &str) -> FrameOutcome {
        match ClientFrame::from_json(text) {
            Ok(frame) => self.handle_frame(frame),
            Err(e) => self.handle_parse_error(text, &e),
        }
    }

    /// Handle one parsed frame.
    pub fn handle_frame(&mut self, frame: ClientFrame) -> FrameOutcome {
        match frame {
            ClientFrame::Call(request) => {
                let _ = tracing::Span::current().record("frame_type", "call");
                debug!(
                    request_id = request.request_id,
                    service = %request.service_id,
                    method = %request.method,
                    "call"
                );
                FrameOutcome::Call(router::dispatch_call(
                    &self.registry,
                    self.scope.connection(),
                    request,
                    self.call_timeout,
                ))
            }
            ClientFrame::Listen(request) => {
                let _ = tracing::Span::current().record("frame_type", "listen");
                debug!(
                    service = %request.service_id,
                    channel = %request.channel,
                    seq = request.seq,
                    "listen"
                );
                FrameOutcome::Listen(subscriptions::handle_listen(
                    &self.registry,
                    &mut self.scope,
                    request,
                ))
            }
            ClientFrame::Unlisten(request) => {
                let _ = tracing::Span::current().record("frame_type", "unlisten");
                debug!(service = %request.service_id, seq = request.seq, "unlisten");
                FrameOutcome::Unlisten(subscriptions::handle_unlisten(&mut self.scope, &request))
            }
        }
    }

    fn handle_parse_error(&self, text: &str, error: &serde_json::Error) -> FrameOutcome {
        let raw: Option<Value> = serde_json::from_str(text).ok();
        let request_id = raw
            .as_ref()
            .and_then(|v| v.get("requestId"))
            .and_then(Value::as_u64);
        let Some(request_id) = request_id else {
            warn!(error = %error, len = text.len(), "unparseable frame dropped");
            return FrameOutcome::Dropped;
        };

        warn!(error = %error, request_id, "malformed frame");
        let field = |name: &str| {
            raw.as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let err = RpcError::Parse {
            message: error.to_string(),
        };
        let response = Response {
            request_id,
            service_id: field("id"),
            method: field("method"),
            result: None,
            error: Some(err.to_error_body()),
        };
        let _ = self.scope.connection().queue_response(response);
        FrameOutcome::ParseErrorSent
    }

    /// The connection's subscription scope.
    pub fn scope(&self) -> &ConnectionScope {
        &self.scope
    }

    /// Close the connection scope (stop sinks, dispose handles).
    pub fn close(&mut self) -> usize {
        self.scope.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tether_core::errors::PARSE_ERROR;
    use tether_core::{Disposable, Service, ServiceError};
    use tokio::sync::mpsc;

    fn handler() -> (FrameHandler, mpsc::Receiver<String>) {
        let store = Service::builder("store")
            .call("query", |params| async move {
                Ok::<_, ServiceError>(json!({"name": params.first().cloned(), "price": 10}))
            })
            .subscribe("onChange", |_, sink| {
                let _ = sink.emit(json!("hello"));
                Ok(Some(Disposable::from_fn("change", || {})))
            })
            .build()
            .unwrap();
        let mut registry = ServiceRegistry::new();
        let _ = registry.register(store);
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new("conn_h".into(), tx));
        (
            FrameHandler::new(Arc::new(registry), conn, Duration::from_secs(5)),
            rx,
        )
    }

    async fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn call_frame_gets_response() {
        let (mut h, mut rx) = handler();
        let outcome = h.handle_text(
            r#"{"type":"call","requestId":1,"id":"store","method":"query","params":["100"]}"#,
        );
        assert_matches!(outcome, FrameOutcome::Call(CallDispatch::Spawned(_)));
        let v = next_json(&mut rx).await;
        assert_eq!(v["type"], "response");
        assert_eq!(v["requestId"], 1);
        assert_eq!(v["result"], json!({"name": "100", "price": 10}));
    }

    #[tokio::test]
    async fn unknown_method_gets_not_found() {
        let (mut h, mut rx) = handler();
        let _ = h.handle_text(r#"{"type":"call","requestId":2,"id":"store","method":"nope"}"#);
        let v = next_json(&mut rx).await;
        assert_eq!(v["error"]["code"], -32601);
        assert_eq!(v["error"]["message"], "Method not found");
    }

    #[tokio::test]
    async fn listen_then_unlisten() {
        let (mut h, mut rx) = handler();
        let outcome =
            h.handle_text(r#"{"type":"listen","id":"store","seq":5,"channel":"Change","params":[]}"#);
        assert_matches!(
            outcome,
            FrameOutcome::Listen(ListenOutcome::Established { disposable: true })
        );
        let v = next_json(&mut rx).await;
        assert_eq!(v["type"], "notify");
        assert_eq!(v["seq"], 5);
        assert_eq!(v["params"], json!(["hello"]));

        let outcome = h.handle_text(r#"{"type":"unlisten","id":"store","seq":5}"#);
        assert_matches!(outcome, FrameOutcome::Unlisten(true));
        assert_eq!(h.scope().active_count(), 0);
    }

    #[tokio::test]
    async fn malformed_frame_with_request_id_answered() {
        let (mut h, mut rx) = handler();
        let outcome = h.handle_text(r#"{"type":"call","requestId":8,"id":"store"}"#);
        assert_matches!(outcome, FrameOutcome::ParseErrorSent);
        let v = next_json(&mut rx).await;
        assert_eq!(v["requestId"], 8);
        assert_eq!(v["id"], "store");
        assert_eq!(v["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn garbage_dropped() {
        let (mut h, mut rx) = handler();
        assert_matches!(h.handle_text("not json at all"), FrameOutcome::Dropped);
        assert_matches!(h.handle_text(r#"{"type":"call"}"#), FrameOutcome::Dropped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_releases_scope() {
        let (mut h, _rx) = handler();
        let _ = h.handle_text(r#"{"type":"listen","id":"store","seq":1,"channel":"Change"}"#);
        assert_eq!(h.scope().disposable_count(), 1);
        assert_eq!(h.close(), 0);
        assert_eq!(h.scope().disposable_count(), 0);
        assert!(!h.scope().connection().is_open());
    }
}
