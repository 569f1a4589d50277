//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tether_core::ServerFrame;
use tether_core::protocol::Established;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::registry::ServiceRegistry;

use super::connection::ClientConnection;
use super::handler::FrameHandler;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::tracker::ConnectionTracker;

/// How long the outbound task gets to flush and send Close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Run a WebSocket session for a connected client.
///
/// 1. Sends an `established` frame with the connection id
/// 2. Routes inbound frames through a [`FrameHandler`]
/// 3. Forwards outbound frames and periodic Pings via the send channel
/// 4. Drops the client on heartbeat timeout or server shutdown
/// 5. Closes the connection scope, releasing every subscription
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: String,
    registry: Arc<ServiceRegistry>,
    tracker: Arc<ConnectionTracker>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));

    info!(conn_id, "client connected");
    counter!("tether_connections_total").increment(1);
    gauge!("tether_connections_active").increment(1.0);
    tracker.add(connection.clone()).await;

    let greeting = ServerFrame::Established(Established {
        connection_id: conn_id.clone(),
    });
    if let Ok(json) = greeting.to_json() {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let close_outbound = CancellationToken::new();
    let outbound_close = close_outbound.clone();
    let ping_every = config.heartbeat_interval();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_close.cancelled() => {
                    while let Ok(text) = send_rx.try_recv() {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let heartbeat_cancel = CancellationToken::new();
    let mut heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        config.heartbeat_interval(),
        config.heartbeat_timeout(),
        heartbeat_cancel.clone(),
    ));

    let mut handler = FrameHandler::new(registry, connection.clone(), config.call_timeout());

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(conn_id, error = %e, "websocket read error");
                        break;
                    }
                    None => break,
                };
                connection.mark_alive();
                match msg {
                    Message::Text(text) => {
                        let _ = handler.handle_text(text.as_str());
                    }
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            let _ = handler.handle_text(text);
                        }
                        Err(_) => {
                            info!(conn_id, len = data.len(), "received non-UTF8 binary frame");
                        }
                    },
                    Message::Close(_) => {
                        info!(conn_id, "client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            result = &mut heartbeat => {
                if matches!(result, Ok(HeartbeatResult::TimedOut)) {
                    warn!(
                        conn_id,
                        timeout_ms = config.heartbeat_timeout_ms,
                        "client unresponsive, disconnecting"
                    );
                    counter!("tether_heartbeat_timeouts_total").increment(1);
                }
                break;
            }
            () = shutdown.cancelled() => {
                info!(conn_id, "server shutting down, closing connection");
                break;
            }
        }
    }

    // Clean up
    heartbeat_cancel.cancel();
    heartbeat.abort();
    let failed = handler.close();
    close_outbound.cancel();
    if tokio::time::timeout(CLOSE_GRACE, &mut outbound).await.is_err() {
        outbound.abort();
    }
    tracker.remove(&conn_id).await;

    info!(
        conn_id,
        dropped = connection.drop_count(),
        dispose_failures = failed,
        "client disconnected"
    );
    counter!("tether_disconnections_total").increment(1);
    gauge!("tether_connections_active").decrement(1.0);
    histogram!("tether_connection_duration_seconds")
        .record(connection.age().as_secs_f64());
}
