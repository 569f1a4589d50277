//! Call routing: resolve a call frame to a call-kind handler, run it, and
//! answer with exactly one response frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tether_core::{CallHandler, CallRequest, Response, RpcError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::registry::ServiceRegistry;
use crate::websocket::connection::ClientConnection;

/// Calls slower than this are logged.
const SLOW_CALL: Duration = Duration::from_secs(5);

/// What happened to a call frame.
#[derive(Debug)]
pub enum CallDispatch {
    /// Rejected before running; the response was sent already.
    Rejected(Response),
    /// Handler running on its own task; it sends the response when done.
    Spawned(JoinHandle<()>),
}

/// Find the call-kind handler for a request.
///
/// Unknown service, unknown method, and subscribe-kind methods all resolve to
/// `MethodNotFound`.
pub fn resolve_call(
    registry: &ServiceRegistry,
    request: &CallRequest,
) -> Result<Arc<dyn CallHandler>, RpcError> {
    registry
        .get(&request.service_id)
        .and_then(|svc| svc.call_handler(&request.method))
        .ok_or_else(|| RpcError::MethodNotFound {
            service: request.service_id.clone(),
            method: request.method.clone(),
        })
}

/// Run a handler with a timeout and build its response.
pub async fn execute_call(
    handler: Arc<dyn CallHandler>,
    request: CallRequest,
    timeout: Duration,
) -> Response {
    let service = request.service_id.clone();
    let method = request.method.clone();
    counter!("tether_calls_total", "service" => service.clone(), "method" => method.clone())
        .increment(1);

    let start = Instant::now();
    let params = request.params.clone();
    let outcome = tokio::time::timeout(timeout, handler.call(params)).await;

    let response = match outcome {
        Ok(Ok(result)) => Response::success(&request, result),
        Ok(Err(err)) => {
            let err = RpcError::from(err);
            counter!(
                "tether_call_errors_total",
                "service" => service.clone(),
                "method" => method.clone(),
                "error_type" => "invocation"
            )
            .increment(1);
            debug!(service, method, error = %err, "call failed");
            Response::failure(&request, err.to_error_body())
        }
        Err(_elapsed) => {
            counter!(
                "tether_call_errors_total",
                "service" => service.clone(),
                "method" => method.clone(),
                "error_type" => "timeout"
            )
            .increment(1);
            error!(service, method, "call handler timed out after {:?}", timeout);
            let err = RpcError::Invocation {
                code: tether_core::errors::INVOCATION_ERROR,
                name: "TimeoutError".into(),
                message: format!("{service}.{method} timed out after {}ms", timeout.as_millis()),
                data: None,
            };
            Response::failure(&request, err.to_error_body())
        }
    };

    let duration = start.elapsed();
    histogram!(
        "tether_call_duration_seconds",
        "service" => service.clone(),
        "method" => method.clone()
    )
    .record(duration.as_secs_f64());
    if duration >= SLOW_CALL {
        warn!(service, method, duration_secs = duration.as_secs_f64(), "slow call");
    }

    response
}

/// Route one call frame for a connection.
///
/// Calls on one connection complete independently of each other. Responses
/// wait for room in the outbound queue rather than being dropped; only a
/// session that has closed meanwhile loses its response.
pub fn dispatch_call(
    registry: &ServiceRegistry,
    connection: &Arc<ClientConnection>,
    request: CallRequest,
    timeout: Duration,
) -> CallDispatch {
    let handler = match resolve_call(registry, &request) {
        Ok(handler) => handler,
        Err(err) => {
            counter!(
                "tether_call_errors_total",
                "service" => request.service_id.clone(),
                "method" => request.method.clone(),
                "error_type" => "method_not_found"
            )
            .increment(1);
            debug!(service = %request.service_id, method = %request.method, "method not found");
            let response = Response::failure(&request, err.to_error_body());
            let _ = connection.queue_response(response.clone());
            return CallDispatch::Rejected(response);
        }
    };

    let connection = Arc::clone(connection);
    CallDispatch::Spawned(tokio::spawn(async move {
        let request_id = request.request_id;
        let response = execute_call(handler, request, timeout).await;
        if !connection.send_response(response).await {
            debug!(conn_id = %connection.id, request_id, "response discarded, session closed");
        }
    }))
}
