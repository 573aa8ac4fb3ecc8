//! Gateway server setup
//!
//! Routes for both client transports and the control plane, plus the serve loop
//! with graceful shutdown.

mod heartbeat;
mod polling;
mod state;
mod websocket;

pub use heartbeat::HeartbeatMonitor;
pub use polling::{close_poll, open_poll, poll, PollHandshake, PollSession, PollSessions};
pub use state::GatewayState;
pub use websocket::websocket_handler;

use crate::api;
use crate::connection::CloseReason;
use crate::middleware::apply_middleware;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use notify_common::{AppConfig, AppError};
use serde::Serialize;
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/poll", post(open_poll))
        .route("/poll/:connection_id", get(poll).delete(close_poll))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .nest("/internal/v1", api::routes())
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    apply_middleware(create_router()).with_state(state)
}

/// Liveness check
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessResponse {
    status: &'static str,
    connections: usize,
    rooms: usize,
    delivery_queue_open: bool,
}

/// Readiness check; fails once the delivery queue has shut down
async fn readiness_check(
    State(state): State<GatewayState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let queue_open = state.delivery_queue().is_open();
    let response = ReadinessResponse {
        status: if queue_open { "ready" } else { "shutting_down" },
        connections: state.connections().count(),
        rooms: state.rooms().room_count(),
        delivery_queue_open: queue_open,
    };
    let status = if queue_open {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Serve on an already bound listener until `shutdown` resolves
///
/// On shutdown every live connection is closed with `DisconnectedByServer`, then
/// the heartbeat monitor is stopped and the delivery queue drained.
pub async fn serve<F>(
    listener: TcpListener,
    state: GatewayState,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = HeartbeatMonitor::spawn(state.clone(), stop_rx);

    let hub = state.hub().clone();
    let queue = state.delivery_queue().clone();
    let app = create_app(state);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = hub.disconnect_all(&CloseReason::ServerShutdown);
            tracing::info!(closed, "Shutting down gateway");
        })
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")));

    stop_tx.send_replace(true);
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "Heartbeat monitor ended abnormally");
    }
    queue.shutdown().await;

    tracing::info!("Gateway stopped");
    result
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr = config.gateway.address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!(
        address = %addr,
        transports = ?config.transport.enabled,
        max_connections = config.transport.max_connections,
        "Gateway listening"
    );

    let state = GatewayState::new(config);
    serve(listener, state, shutdown_signal()).await
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
