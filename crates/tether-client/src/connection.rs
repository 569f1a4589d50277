//! Connection driver: owns the WebSocket, reconnects with backoff and replays
//! subscriptions on every new connection.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tether_core::ServerFrame;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Dialing the server.
    Connecting,
    /// Connected; frames flow.
    Connected,
    /// Lost the connection; waiting to retry.
    Disconnected,
    /// Closed by the client; terminal.
    Closed,
}

/// Why a single connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    Lost,
    Closed,
}

/// Run until `shutdown` fires, reconnecting after every loss.
#[instrument(skip_all, fields(endpoint = %config.endpoint))]
pub(crate) async fn run_driver(
    dispatcher: Arc<Dispatcher>,
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new(config.reconnect_initial(), config.reconnect_max());

    loop {
        let _ = state.send_replace(ConnectionState::Connecting);
        let dial = connect_async(config.endpoint.as_str());
        let attempt = tokio::select! {
            result = tokio::time::timeout(config.connect_timeout(), dial) => result,
            () = shutdown.cancelled() => break,
        };

        match attempt {
            Ok(Ok((ws, _))) => {
                backoff.reset();
                if run_connection(ws, &dispatcher, &state, &shutdown).await == SessionEnd::Closed {
                    break;
                }
            }
            Ok(Err(e)) => {
                warn!(attempt = backoff.attempt(), error = %e, "connect failed");
                dispatcher.record_connect_error(e.to_string());
            }
            Err(_) => {
                warn!(
                    attempt = backoff.attempt(),
                    timeout_ms = config.connect_timeout_ms,
                    "connect timed out"
                );
            }
        }

        let _ = state.send_replace(ConnectionState::Disconnected);
        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown.cancelled() => break,
        }
    }

    let _ = state.send_replace(ConnectionState::Closed);
    let _ = dispatcher.detach(|| ClientError::Closed);
    debug!("driver stopped");
}

/// Pump one connection until it drops or the client closes.
async fn run_connection(
    ws: WsStream,
    dispatcher: &Dispatcher,
    state: &watch::Sender<ConnectionState>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let replayed = dispatcher.attach(tx);
    let _ = state.send_replace(ConnectionState::Connected);
    info!(replayed, "connected");

    let end = loop {
        tokio::select! {
            out = rx.recv() => {
                let Some(text) = out else { break SessionEnd::Lost };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    warn!(error = %e, "websocket write failed");
                    break SessionEnd::Lost;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_server_text(dispatcher, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => handle_server_text(dispatcher, text),
                    Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(reason = ?frame, "server closed connection");
                    break SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break SessionEnd::Lost;
                }
                None => break SessionEnd::Lost,
            },
            () = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break SessionEnd::Closed;
            }
        }
    };

    // state first, so callers woken by the failed calls never see Connected
    let failed = match end {
        SessionEnd::Lost => {
            let _ = state.send_replace(ConnectionState::Disconnected);
            dispatcher.detach(|| ClientError::ConnectionLost)
        }
        SessionEnd::Closed => {
            let _ = state.send_replace(ConnectionState::Closed);
            dispatcher.detach(|| ClientError::Closed)
        }
    };
    info!(failed_calls = failed, end = ?end, "connection ended");
    end
}

/// Route one server frame to the dispatcher.
fn handle_server_text(dispatcher: &Dispatcher, text: &str) {
    match ServerFrame::from_json(text) {
        Ok(ServerFrame::Established(established)) => {
            debug!(connection_id = %established.connection_id, "established");
            dispatcher.set_connection_id(established.connection_id);
        }
        Ok(ServerFrame::Response(response)) => dispatcher.resolve(response),
        Ok(ServerFrame::Notify(notification)) => dispatcher.notify(notification),
        Err(e) => warn!(error = %e, len = text.len(), "unparseable server frame"),
    }
}
