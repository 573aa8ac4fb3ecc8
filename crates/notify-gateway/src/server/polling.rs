//! HTTP long-polling transport
//!
//! Fallback for clients whose WebSocket upgrade is blocked. `POST /poll` performs
//! the handshake, `GET /poll/:id` holds the request open until events arrive or
//! the poll wait elapses, and `DELETE /poll/:id` closes the connection. Every poll
//! counts as a heartbeat.

use crate::api::ApiError;
use crate::auth::Credential;
use crate::connection::{CloseReason, Connection, ConnectionRegistry, ConnectionSlot};
use crate::protocol::GatewayMessage;
use crate::server::GatewayState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use dashmap::DashMap;
use notify_common::TransportKind;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Server-side half of a long-poll connection
#[derive(Debug)]
pub struct PollSession {
    connection: Arc<Connection>,
    receiver: Mutex<mpsc::Receiver<GatewayMessage>>,
    _slot: ConnectionSlot,
}

impl PollSession {
    #[must_use]
    pub fn new(
        connection: Arc<Connection>,
        receiver: mpsc::Receiver<GatewayMessage>,
        slot: ConnectionSlot,
    ) -> Self {
        Self {
            connection,
            receiver: Mutex::new(receiver),
            _slot: slot,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

/// Outbound queues of long-poll connections, keyed by connection id
#[derive(Debug, Default)]
pub struct PollSessions {
    sessions: DashMap<String, Arc<PollSession>>,
}

impl PollSessions {
    pub fn insert(&self, session: PollSession) {
        self.sessions
            .insert(session.connection.id().to_string(), Arc::new(session));
    }

    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<Arc<PollSession>> {
        self.sessions.get(connection_id).map(|s| Arc::clone(&s))
    }

    pub fn remove(&self, connection_id: &str) -> bool {
        self.sessions.remove(connection_id).is_some()
    }

    /// Drop sessions whose connection is no longer registered
    pub fn prune(&self, registry: &ConnectionRegistry) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|id, _| registry.get_connection(id).is_some());
        before - self.sessions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Handshake response for `POST /poll`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHandshake {
    pub connection_id: String,
    /// Milliseconds between polls that keep the connection alive
    pub heartbeat_interval: u64,
    /// Milliseconds a poll is held open when no events are pending
    pub poll_wait: u64,
}

/// `POST /poll`
pub async fn open_poll(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    credential: Credential,
) -> Result<Json<PollHandshake>, ApiError> {
    let slot = state.admit(TransportKind::Polling, &headers)?;
    let identity = state
        .auth_gate()
        .authenticate(credential.as_deref())
        .inspect_err(|e| {
            tracing::info!(error_code = e.error_code(), "Long-poll authentication failed");
        })?;

    let established = state.hub().establish(identity, TransportKind::Polling)?;
    let connection_id = established.connection.id().to_string();
    state.poll_sessions().insert(PollSession::new(
        established.connection,
        established.receiver,
        slot,
    ));

    Ok(Json(PollHandshake {
        connection_id,
        heartbeat_interval: state.transport().heartbeat_interval_ms,
        poll_wait: state.transport().poll_wait_ms,
    }))
}

/// `GET /poll/:connection_id`
pub async fn poll(
    State(state): State<GatewayState>,
    Path(connection_id): Path<String>,
    credential: Credential,
) -> Result<Json<Vec<GatewayMessage>>, ApiError> {
    let session = authorize(&state, &connection_id, &credential)?;
    let connection = session.connection();

    let mut close_signal = connection.close_signal();
    if !connection.is_active() {
        return Err(gone(&state, &connection_id, connection));
    }

    let mut receiver = session
        .receiver
        .try_lock()
        .map_err(|_| ApiError::PollInProgress)?;
    connection.touch();

    let mut frames = Vec::new();
    tokio::select! {
        message = receiver.recv() => frames.extend(message),
        _ = close_signal.changed() => {}
        () = tokio::time::sleep(state.transport().poll_wait()) => {}
    }
    while let Ok(message) = receiver.try_recv() {
        frames.push(message);
    }
    drop(receiver);

    connection.touch();

    if frames.is_empty() && !connection.is_active() {
        return Err(gone(&state, &connection_id, connection));
    }

    tracing::trace!(connection_id = %connection_id, frames = frames.len(), "Poll answered");
    Ok(Json(frames))
}

/// `DELETE /poll/:connection_id`
pub async fn close_poll(
    State(state): State<GatewayState>,
    Path(connection_id): Path<String>,
    credential: Credential,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &connection_id, &credential)?;

    state
        .hub()
        .disconnect(&connection_id, CloseReason::ClientClosed);
    state.poll_sessions().remove(&connection_id);

    Ok(StatusCode::NO_CONTENT)
}

/// Check the poll credential belongs to the connection's user
fn authorize(
    state: &GatewayState,
    connection_id: &str,
    credential: &Credential,
) -> Result<Arc<PollSession>, ApiError> {
    let identity = state.auth_gate().authenticate(credential.as_deref())?;

    let session = state
        .poll_sessions()
        .get(connection_id)
        .ok_or_else(|| ApiError::ConnectionGone("unknown connection".to_string()))?;

    if session.connection().user_id() != identity.user_id {
        tracing::warn!(
            connection_id = %connection_id,
            user_id = %identity.user_id,
            "Poll credential does not match connection owner"
        );
        return Err(ApiError::ConnectionForbidden);
    }

    Ok(session)
}

fn gone(state: &GatewayState, connection_id: &str, connection: &Connection) -> ApiError {
    state.poll_sessions().remove(connection_id);
    let reason = connection
        .close_reason()
        .map_or_else(|| "connection closed".to_string(), |r| r.message());
    ApiError::ConnectionGone(reason)
}
