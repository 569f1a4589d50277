//! Subscription management: listen and unlisten frames against a
//! connection's scope.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use tether_core::disposable::panic_message;
use tether_core::protocol::method_for_channel;
use tether_core::{ListenRequest, NotifySink, NotifyTarget, RpcError, UnlistenRequest};
use tracing::{debug, info, warn};

use crate::registry::ServiceRegistry;
use crate::scope::{ConnectionScope, SubscriptionKey};

/// Result of handling a listen frame.
#[derive(Debug)]
pub enum ListenOutcome {
    /// Subscribe handler ran; `disposable` says whether it returned a handle.
    Established {
        /// Whether a release handle was recorded.
        disposable: bool,
    },
    /// Same `(service, channel, seq)` already active on this connection.
    Duplicate,
    /// No such service.
    UnknownService,
    /// Service has no `on{channel}` subscribe-kind method.
    UnknownChannel,
    /// The handler failed or panicked during setup.
    SetupFailed(RpcError),
}

/// Establish a subscription for a listen frame.
///
/// Every failure is logged and swallowed; the connection stays usable.
pub fn handle_listen(
    registry: &ServiceRegistry,
    scope: &mut ConnectionScope,
    request: ListenRequest,
) -> ListenOutcome {
    let ListenRequest {
        service_id,
        seq,
        channel,
        params,
    } = request;
    let conn_id = scope.connection().id.clone();

    let Some(service) = registry.get(&service_id) else {
        info!(conn_id, service = %service_id, channel, seq, "listen for unknown service ignored");
        return ListenOutcome::UnknownService;
    };
    let method = method_for_channel(&channel);
    let Some(handler) = service.subscribe_handler(&method) else {
        info!(conn_id, service = %service_id, method, seq, "listen for unknown channel ignored");
        return ListenOutcome::UnknownChannel;
    };

    let key = SubscriptionKey {
        service_id: service_id.clone(),
        channel,
        seq,
    };
    if scope.contains(&key) {
        debug!(conn_id, service = %service_id, method, seq, "duplicate listen ignored");
        return ListenOutcome::Duplicate;
    }

    let target: Arc<dyn NotifyTarget> = scope.connection().clone();
    let sink = NotifySink::new(target, seq, &service_id, &method);
    let setup = catch_unwind(AssertUnwindSafe(|| handler.subscribe(params, sink.clone())));

    let failure = match setup {
        Ok(Ok(handle)) => {
            let disposable = handle.is_some();
            scope.insert(key, sink, handle);
            counter!(
                "tether_subscriptions_total",
                "service" => service_id.clone(),
                "method" => method.clone()
            )
            .increment(1);
            debug!(
                conn_id,
                service = %service_id,
                method,
                seq,
                disposable,
                "subscription established"
            );
            return ListenOutcome::Established { disposable };
        }
        Ok(Err(err)) => err.message,
        Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
    };

    sink.retire();
    counter!(
        "tether_subscription_errors_total",
        "service" => service_id.clone(),
        "method" => method.clone()
    )
    .increment(1);
    let err = RpcError::SubscriptionSetup {
        service: service_id,
        method,
        message: failure,
    };
    warn!(conn_id, error = %err, "subscription setup failed");
    ListenOutcome::SetupFailed(err)
}

/// Release a subscription for an unlisten frame. Returns whether it existed.
pub fn handle_unlisten(scope: &mut ConnectionScope, request: &UnlistenRequest) -> bool {
    let released = scope.release(&request.service_id, request.seq);
    if !released {
        debug!(
            conn_id = %scope.connection().id,
            service = %request.service_id,
            seq = request.seq,
            "unlisten for unknown subscription"
        );
    }
    released
}
