//! Control-plane HTTP surface
//!
//! Exposes the delivery service to backend callers as JSON over HTTP.

mod extractors;
mod handlers;
mod response;

pub use extractors::{OptionalValidatedJson, ValidatedJson};
pub use response::{ApiError, ApiResult, ErrorBody, ErrorDetail};

use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::server::GatewayState;

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Control-plane routes, mounted under `/internal/v1`
pub fn routes() -> Router<GatewayState> {
    Router::new()
        .merge(delivery_routes())
        .merge(user_routes())
        .merge(room_routes())
        .merge(stats_routes())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::SERVICE_UNAVAILABLE,
            API_TIMEOUT,
        ))
}

fn delivery_routes() -> Router<GatewayState> {
    Router::new()
        .route("/deliveries/user", post(handlers::send_to_user))
        .route("/deliveries/users", post(handlers::send_to_users))
        .route("/deliveries/room", post(handlers::broadcast_to_room))
}

fn user_routes() -> Router<GatewayState> {
    Router::new()
        .route("/users/:user_id/connections", get(handlers::user_connections))
        .route("/users/:user_id/disconnect", post(handlers::disconnect_user))
}

fn room_routes() -> Router<GatewayState> {
    Router::new()
        .route("/rooms/:room_id", get(handlers::get_room))
        .route("/rooms/:room_id/members", post(handlers::join_room))
        .route(
            "/rooms/:room_id/members/:user_id",
            delete(handlers::leave_room),
        )
}

fn stats_routes() -> Router<GatewayState> {
    Router::new()
        .route("/stats", get(handlers::connection_stats))
        .route("/stats/deliveries", get(handlers::delivery_stats))
}
