//! Error codes, the server-side error taxonomy and the error type services
//! fail with.

use serde_json::Value;

use crate::protocol::ErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Unknown service, unknown method, or a subscribe-kind method invoked as a call.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Default code for a failed call when the service gave none.
pub const INVOCATION_ERROR: i64 = -32000;
/// Frame could not be parsed.
pub const PARSE_ERROR: i64 = -32700;

/// Message carried by every `MethodNotFound` response.
pub const METHOD_NOT_FOUND_MESSAGE: &str = "Method not found";

/// Error raised by a service method.
///
/// `code` falls back to [`INVOCATION_ERROR`] on the wire when unset.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ServiceError {
    /// Optional service-defined numeric code.
    pub code: Option<i64>,
    /// Error class name reported to the caller.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    pub data: Option<Value>,
}

impl ServiceError {
    /// Plain error named `Error`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// Error with an explicit class name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            name: name.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach a numeric code.
    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::named("InvalidParams", err.to_string())
    }
}

/// Failure the server reports for a frame.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No call-kind method with this name on this service.
    #[error("Method not found")]
    MethodNotFound {
        /// Service the frame addressed.
        service: String,
        /// Method the frame addressed.
        method: String,
    },

    /// The call-kind handler failed or timed out.
    #[error("{message}")]
    Invocation {
        /// Numeric code (service-defined or [`INVOCATION_ERROR`]).
        code: i64,
        /// Error class name from the service.
        name: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },

    /// The subscribe-kind handler failed during setup. Logged, never sent.
    #[error("{service}.{method}: {message}")]
    SubscriptionSetup {
        /// Service the listen addressed.
        service: String,
        /// Subscribe-kind method name.
        method: String,
        /// Failure description.
        message: String,
    },

    /// The frame was not valid JSON or not a known frame type.
    #[error("{message}")]
    Parse {
        /// Parser error text.
        message: String,
    },
}

impl RpcError {
    /// Numeric wire code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Invocation { code, .. } => *code,
            Self::SubscriptionSetup { .. } => INVOCATION_ERROR,
            Self::Parse { .. } => PARSE_ERROR,
        }
    }

    /// Error class name sent on the wire.
    pub fn name(&self) -> &str {
        match self {
            Self::MethodNotFound { .. } => "MethodNotFound",
            Self::Invocation { .. } => "InvocationError",
            Self::SubscriptionSetup { .. } => "SubscriptionSetupError",
            Self::Parse { .. } => "ParseError",
        }
    }

    /// Convert to the wire-format error body.
    ///
    /// `Invocation` keeps the service's own class name in `name` when it
    /// gave one other than the generic `Error`.
    pub fn to_error_body(&self) -> ErrorBody {
        let name = match self {
            Self::Invocation { name, .. } if !name.is_empty() && name != "Error" => name.clone(),
            _ => self.name().to_owned(),
        };
        ErrorBody {
            code: self.code(),
            name: Some(name),
            message: self.to_string(),
            data: match self {
                Self::Invocation { data, .. } => data.clone(),
                _ => None,
            },
        }
    }
}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        Self::Invocation {
            code: err.code.unwrap_or(INVOCATION_ERROR),
            name: err.name,
            message: err.message,
            data: err.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_not_found_code_and_message() {
        let err = RpcError::MethodNotFound {
            service: "store".into(),
            method: "missing".into(),
        };
        assert_eq!(err.code(), -32601);
        let body = err.to_error_body();
        assert_eq!(body.code, METHOD_NOT_FOUND);
        assert_eq!(body.message, "Method not found");
        assert_eq!(body.name.as_deref(), Some("MethodNotFound"));
        assert!(body.data.is_none());
    }

    #[test]
    fn service_error_defaults_to_invocation_code() {
        let err: RpcError = ServiceError::new("boom").into();
        assert_eq!(err.code(), INVOCATION_ERROR);
        let body = err.to_error_body();
        assert_eq!(body.message, "boom");
        assert_eq!(body.name.as_deref(), Some("InvocationError"));
    }

    #[test]
    fn service_error_keeps_code_name_and_data() {
        let err: RpcError = ServiceError::named("OutOfStock", "no more")
            .with_code(42)
            .with_data(json!({"sku": "100"}))
            .into();
        let body = err.to_error_body();
        assert_eq!(body.code, 42);
        assert_eq!(body.name.as_deref(), Some("OutOfStock"));
        assert_eq!(body.message, "no more");
        assert_eq!(body.data.unwrap()["sku"], "100");
    }

    #[test]
    fn parse_error_code() {
        let err = RpcError::Parse { message: "eof".into() };
        assert_eq!(err.code(), PARSE_ERROR);
        assert_eq!(err.name(), "ParseError");
    }

    #[test]
    fn subscription_setup_display() {
        let err = RpcError::SubscriptionSetup {
            service: "store".into(),
            method: "onPriceChange".into(),
            message: "bad symbol".into(),
        };
        assert_eq!(err.to_string(), "store.onPriceChange: bad symbol");
        assert_eq!(err.name(), "SubscriptionSetupError");
    }

    #[test]
    fn serde_error_becomes_invalid_params() {
        let serde_err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = ServiceError::from(serde_err);
        assert_eq!(err.name, "InvalidParams");
        assert!(err.code.is_none());
    }

    #[test]
    fn service_error_display() {
        assert_eq!(ServiceError::new("nope").to_string(), "Error: nope");
    }
}
