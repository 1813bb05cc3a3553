//! `TetherServer` — Axum HTTP side channel + WebSocket bridge endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{Json, Response};
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tracing::info;

use tether_core::{ConnectionId, HealthStatus};

use crate::bridge::ToolBridge;
use crate::config::ServerConfig;
use crate::session::run_session;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Bridge state and caller API.
    pub bridge: Arc<ToolBridge>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The tool server accepting the editor bridge.
pub struct TetherServer {
    config: ServerConfig,
    bridge: Arc<ToolBridge>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl TetherServer {
    /// Create a server around a fresh bridge.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let bridge = ToolBridge::new(config.clone());
        Self {
            config,
            bridge,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with the `/health` side channel and the
    /// `/bridge` WebSocket endpoint.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: Arc::clone(&self.bridge),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };
        Router::new()
            .route("/health", get(health_handler))
            .route("/bridge", get(bridge_handler))
            .with_state(state)
    }

    /// Bind and serve; returns the bound address and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
        });
        info!(%addr, "tether server listening");
        Ok((addr, handle))
    }

    /// The bridge (caller API and state).
    #[must_use]
    pub fn bridge(&self) -> &Arc<ToolBridge> {
        &self.bridge
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health — the pre-flight gate body, never used for data exchange.
async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::current(
        state.start_time,
        state.bridge.is_connected(),
    ))
}

/// GET /bridge — upgrade to the stateful editor connection.
async fn bridge_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let bridge = state.bridge;
    let shutdown = state.shutdown.token();
    ws.on_upgrade(move |socket| run_session(socket, ConnectionId::new(), bridge, shutdown))
}
