//! `TetherServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthInputs, HealthResponse};
use crate::registry::ServiceRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;
use crate::websocket::tracker::ConnectionTracker;

/// Handles every route shares.
#[derive(Clone)]
pub struct AppState {
    /// Registered services.
    pub registry: Arc<ServiceRegistry>,
    /// Live connections.
    pub tracker: Arc<ConnectionTracker>,
    /// Stop signal for sessions.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// One permit per allowed session.
    pub slots: Arc<Semaphore>,
    /// Construction time, for uptime.
    pub start_time: Instant,
}

/// The tether server.
pub struct TetherServer {
    config: Arc<ServerConfig>,
    registry: Arc<ServiceRegistry>,
    tracker: Arc<ConnectionTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    slots: Arc<Semaphore>,
    start_time: Instant,
}

impl TetherServer {
    /// Create a new server. The registry is frozen from here on.
    pub fn new(config: ServerConfig, registry: ServiceRegistry) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(
                config.max_connections.min(Semaphore::MAX_PERMITS),
            )),
            config: Arc::new(config),
            registry: Arc::new(registry),
            tracker: Arc::new(ConnectionTracker::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// `/health` plus the WebSocket upgrade at the configured path.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            slots: self.slots.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route(&self.config.ws_path(), get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address and the accept-loop task, which ends after
    /// [`ShutdownCoordinator::shutdown`] once every session has closed.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        self.config.validate()?;
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(
            addr = %local_addr,
            path = %self.config.ws_path(),
            services = ?self.registry.ids(),
            "tether server listening"
        );
        Ok((local_addr, handle))
    }

    /// Get the connection tracker.
    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// Stop signal shared with every session.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the service registry.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let inputs = HealthInputs {
        connections: state.tracker.connection_count().await,
        dropped_frames: state.tracker.dropped_frames().await,
        services: state.registry.ids(),
        draining: state.shutdown.is_shutting_down(),
    };
    Json(health::health_check(state.start_time, inputs))
}

/// GET {path}: WebSocket upgrade.
///
/// The session slot is taken here, before the upgrade, and travels with the
/// session until teardown.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Ok(slot) = state.slots.clone().try_acquire_owned() else {
        warn!(
            max = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let conn_id = format!("conn_{}", Uuid::now_v7());
    let AppState {
        registry,
        tracker,
        shutdown,
        config,
        ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, conn_id, registry, tracker, config, shutdown.token()).await;
            drop(slot);
        })
        .into_response()
}
