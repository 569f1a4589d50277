//! Client error types.

use serde_json::Value;
use tether_core::ErrorBody;

/// Errors surfaced by [`RpcClient`](crate::RpcClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered the call with an error.
    #[error("[tether rpc] {message}")]
    Remote {
        /// Wire error code.
        code: i64,
        /// Error class name, when the server sent one.
        name: Option<String>,
        /// Error message.
        message: String,
        /// Structured details.
        data: Option<Value>,
    },

    /// Wrong method kind or malformed method name.
    #[error("protocol usage: {0}")]
    ProtocolUsage(String),

    /// The connection dropped before the response arrived.
    #[error("connection lost")]
    ConnectionLost,

    /// The client was closed.
    #[error("client closed")]
    Closed,

    /// No response or connection within the configured time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What timed out.
        operation: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Arguments or results did not (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint is not a `ws://` or `wss://` URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    /// Wire code of a remote error.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this is a `MethodNotFound` answer.
    pub fn is_method_not_found(&self) -> bool {
        self.code() == Some(tether_core::errors::METHOD_NOT_FOUND)
    }
}

impl From<ErrorBody> for ClientError {
    fn from(body: ErrorBody) -> Self {
        Self::Remote {
            code: body.code,
            name: body.name,
            message: body.message,
            data: body.data,
        }
    }
}
