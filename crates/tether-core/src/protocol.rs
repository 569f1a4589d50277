//! Wire frames exchanged between client and server.
//!
//! Every WebSocket text frame is one JSON object tagged by `type`. The
//! service identifier travels as `id` at every layer; calls carry an explicit
//! `requestId` because WebSocket has no per-message acknowledgement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix that marks a method as subscribe-kind (`onPriceChange`).
pub const SUBSCRIBE_PREFIX: &str = "on";

/// Whether a method name is subscribe-kind.
pub fn is_subscribe_method(method: &str) -> bool {
    method.starts_with(SUBSCRIBE_PREFIX)
}

/// Channel name for a subscribe-kind method (`onPriceChange` → `PriceChange`).
///
/// Returns `None` for call-kind names and for the bare prefix.
pub fn channel_of(method: &str) -> Option<&str> {
    method
        .strip_prefix(SUBSCRIBE_PREFIX)
        .filter(|channel| !channel.is_empty())
}

/// Subscribe-kind method name for a channel (`PriceChange` → `onPriceChange`).
pub fn method_for_channel(channel: &str) -> String {
    format!("{SUBSCRIBE_PREFIX}{channel}")
}

// ── Client → server ─────────────────────────────────────────────────

/// Frame sent by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Invoke a call-kind method.
    Call(CallRequest),
    /// Establish a subscription.
    Listen(ListenRequest),
    /// Release a subscription on this connection.
    Unlisten(UnlistenRequest),
}

/// Call-kind invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Client-generated correlation id, echoed on the response.
    pub request_id: u64,
    /// Target service.
    #[serde(rename = "id")]
    pub service_id: String,
    /// Method name.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Subscription registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenRequest {
    /// Target service.
    #[serde(rename = "id")]
    pub service_id: String,
    /// Client-unique subscription sequence number.
    pub seq: u64,
    /// Method name without the subscribe prefix.
    pub channel: String,
    /// Application arguments (the push-callback is appended server-side).
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Subscription release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlistenRequest {
    /// Target service.
    #[serde(rename = "id")]
    pub service_id: String,
    /// Sequence number of the subscription to release.
    pub seq: u64,
}

// ── Server → client ─────────────────────────────────────────────────

/// Frame sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// First frame on every connection.
    Established(Established),
    /// Outcome of one call.
    Response(Response),
    /// Push for an active subscription.
    Notify(Notification),
}

/// Connection greeting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Established {
    /// Server-assigned connection id.
    pub connection_id: String,
}

/// Outcome of a call. Exactly one of `result` / `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Echoed correlation id.
    pub request_id: u64,
    /// Service the call addressed.
    #[serde(rename = "id")]
    pub service_id: String,
    /// Method the call addressed.
    pub method: String,
    /// Resolved value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Structured error inside a [`Response`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code (`-32601`, `-32000`, or service-defined).
    pub code: i64,
    /// Error class name (`MethodNotFound`, `InvocationError`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Push delivered to a subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Subscription this push belongs to.
    pub seq: u64,
    /// Emitting service.
    #[serde(rename = "id")]
    pub service_id: String,
    /// Subscribe-kind method that produced the push.
    pub method: String,
    /// Values passed to the push-callback.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Response {
    /// Build a success response for a call.
    pub fn success(request: &CallRequest, result: Value) -> Self {
        Self {
            request_id: request.request_id,
            service_id: request.service_id.clone(),
            method: request.method.clone(),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response for a call.
    pub fn failure(request: &CallRequest, error: ErrorBody) -> Self {
        Self {
            request_id: request.request_id,
            service_id: request.service_id.clone(),
            method: request.method.clone(),
            result: None,
            error: Some(error),
        }
    }

    /// Whether this response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl ClientFrame {
    /// Parse a frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerFrame {
    /// Parse a frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(request_id: u64, method: &str) -> CallRequest {
        CallRequest {
            request_id,
            service_id: "store".into(),
            method: method.into(),
            params: vec![json!("100")],
        }
    }

    // ── naming convention ───────────────────────────────────────────

    #[test]
    fn subscribe_prefix_classification() {
        assert!(is_subscribe_method("onPriceChange"));
        assert!(is_subscribe_method("onChange"));
        assert!(!is_subscribe_method("query"));
        assert!(!is_subscribe_method("Online"));
    }

    #[test]
    fn channel_strips_prefix_and_preserves_case() {
        assert_eq!(channel_of("onPriceChange"), Some("PriceChange"));
        assert_eq!(channel_of("onlowercase"), Some("lowercase"));
        assert_eq!(channel_of("query"), None);
        assert_eq!(channel_of("on"), None);
    }

    #[test]
    fn method_for_channel_restores_prefix() {
        assert_eq!(method_for_channel("PriceChange"), "onPriceChange");
    }

    // ── client frames ───────────────────────────────────────────────

    #[test]
    fn wire_format_call() {
        let raw = r#"{"type":"call","requestId":3,"id":"store","method":"query","params":["100"]}"#;
        let frame = ClientFrame::from_json(raw).unwrap();
        assert_eq!(frame, ClientFrame::Call(call(3, "query")));
    }

    #[test]
    fn call_without_params_defaults_to_empty() {
        let raw = r#"{"type":"call","requestId":1,"id":"store","method":"ping"}"#;
        let ClientFrame::Call(req) = ClientFrame::from_json(raw).unwrap() else {
            panic!("expected call frame");
        };
        assert!(req.params.is_empty());
    }

    #[test]
    fn wire_format_listen() {
        let raw = r#"{"type":"listen","id":"store","seq":7,"channel":"PriceChange","params":["xxx"]}"#;
        let frame = ClientFrame::from_json(raw).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Listen(ListenRequest {
                service_id: "store".into(),
                seq: 7,
                channel: "PriceChange".into(),
                params: vec![json!("xxx")],
            })
        );
    }

    #[test]
    fn listen_serializes_service_as_id() {
        let frame = ClientFrame::Listen(ListenRequest {
            service_id: "store".into(),
            seq: 1,
            channel: "Change".into(),
            params: vec![],
        });
        let v: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "listen");
        assert_eq!(v["id"], "store");
        assert!(v.get("serviceId").is_none());
    }

    #[test]
    fn wire_format_unlisten() {
        let raw = r#"{"type":"unlisten","id":"store","seq":4}"#;
        let frame = ClientFrame::from_json(raw).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Unlisten(UnlistenRequest {
                service_id: "store".into(),
                seq: 4,
            })
        );
    }

    #[test]
    fn unknown_frame_type_rejected() {
        assert!(ClientFrame::from_json(r#"{"type":"bogus","id":"x"}"#).is_err());
        assert!(ClientFrame::from_json("not json").is_err());
    }

    // ── server frames ───────────────────────────────────────────────

    #[test]
    fn success_response_has_no_error_field() {
        let resp = Response::success(&call(1, "query"), json!({"name": "100", "price": 10}));
        let json = ServerFrame::Response(resp).to_json().unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "response");
        assert_eq!(v["requestId"], 1);
        assert_eq!(v["id"], "store");
        assert_eq!(v["method"], "query");
        assert_eq!(v["result"]["price"], 10);
        assert!(v.get("error").is_none());
    }

    #[test]
    fn error_response_has_no_result_field() {
        let resp = Response::failure(
            &call(2, "missing"),
            ErrorBody {
                code: -32601,
                name: Some("MethodNotFound".into()),
                message: "Method not found".into(),
                data: None,
            },
        );
        assert!(resp.is_error());
        let text = ServerFrame::Response(resp).to_json().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["code"], -32601);
        assert_eq!(v["error"]["message"], "Method not found");
        assert!(v["error"].get("data").is_none());
    }

    #[test]
    fn wire_format_notify() {
        let raw = r#"{"type":"notify","seq":7,"id":"store","method":"onPriceChange","params":[{"name":"xxx","price":42}]}"#;
        let ServerFrame::Notify(n) = ServerFrame::from_json(raw).unwrap() else {
            panic!("expected notify frame");
        };
        assert_eq!(n.seq, 7);
        assert_eq!(n.service_id, "store");
        assert_eq!(n.params[0]["price"], 42);
    }

    #[test]
    fn wire_format_established() {
        let raw = r#"{"type":"established","connectionId":"conn_1"}"#;
        let frame = ServerFrame::from_json(raw).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Established(Established {
                connection_id: "conn_1".into()
            })
        );
    }

    #[test]
    fn null_result_reads_back_as_absent() {
        let raw = r#"{"type":"response","requestId":9,"id":"s","method":"m","result":null}"#;
        let ServerFrame::Response(resp) = ServerFrame::from_json(raw).unwrap() else {
            panic!("expected response frame");
        };
        assert!(resp.result.is_none());
        assert!(!resp.is_error());
    }
}
