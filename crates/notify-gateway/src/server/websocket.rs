//! WebSocket transport
//!
//! Each socket runs hello, authentication, and registration in order, then splits
//! into a receive task and a send task. Whichever ends first decides the close
//! reason; cleanup always goes through the hub.

use crate::api::ApiError;
use crate::auth::Credential;
use crate::connection::{CloseReason, Connection, ConnectionSlot, ConnectionState};
use crate::handlers::{HandlerError, IdentifyHandler, MessageDispatcher};
use crate::hub::Established;
use crate::protocol::{CloseCode, GatewayMessage, HelloPayload};
use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use notify_common::TransportKind;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the send task gets to flush a close frame after the reader ends
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Close frame reasons are limited to 123 bytes on the wire
const MAX_CLOSE_REASON_BYTES: usize = 123;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// `GET /ws`
///
/// Origin, transport, and capacity checks happen before the upgrade so rejected
/// clients get a plain HTTP status.
pub async fn websocket_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    credential: Credential,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let slot = state.admit(TransportKind::WebSocket, &headers)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, credential, slot)))
}

async fn handle_socket(
    state: GatewayState,
    socket: WebSocket,
    credential: Credential,
    slot: ConnectionSlot,
) {
    let (mut sink, mut stream) = socket.split();

    let hello = GatewayMessage::hello(HelloPayload::with_interval(
        state.transport().heartbeat_interval_ms,
    ));
    if send_frame(&mut sink, &hello).await.is_err() {
        tracing::debug!("Socket closed before Hello");
        return;
    }

    tracing::trace!(state = ?ConnectionState::Authenticating, "Awaiting credential");
    let credential = match credential.0 {
        Some(credential) => credential,
        None => match await_identify(&mut stream, state.transport().auth_timeout()).await {
            Ok(credential) => credential,
            Err(Some(code)) => {
                close_with(&mut sink, code, code.description()).await;
                return;
            }
            Err(None) => return,
        },
    };

    let identity = match state.auth_gate().authenticate(Some(&credential)) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(error_code = e.error_code(), "WebSocket authentication failed");
            close_with(&mut sink, CloseCode::AuthenticationFailed, &e.to_string()).await;
            return;
        }
    };

    let Established {
        connection,
        receiver,
        ..
    } = match state.hub().establish(identity, TransportKind::WebSocket) {
        Ok(established) => established,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to establish connection");
            close_with(&mut sink, CloseCode::UnknownError, CloseCode::UnknownError.description())
                .await;
            return;
        }
    };

    run_connection(&state, &connection, sink, stream, receiver).await;
    drop(slot);
}

/// Wait for an Identify frame, or `Err(None)` if the client went away
async fn await_identify(
    stream: &mut WsStream,
    deadline: Duration,
) -> Result<String, Option<CloseCode>> {
    let wait = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let frame = GatewayMessage::decode(&text).map_err(Some)?;
                    match IdentifyHandler::credential(&frame) {
                        Ok(Some(token)) => return Ok(token),
                        Ok(None) => {}
                        Err(e) => return Err(Some(e.to_close_code())),
                    }
                }
                Ok(Message::Binary(_)) => return Err(Some(CloseCode::DecodeError)),
                Ok(Message::Close(_)) | Err(_) => return Err(None),
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
            }
        }
        Err(None)
    };

    tokio::time::timeout(deadline, wait).await.unwrap_or_else(|_| {
        tracing::debug!("Identify deadline elapsed");
        Err(Some(CloseCode::NotAuthenticated))
    })
}

async fn run_connection(
    state: &GatewayState,
    connection: &Arc<Connection>,
    sink: WsSink,
    stream: WsStream,
    receiver: mpsc::Receiver<GatewayMessage>,
) {
    let connection_id = connection.id().to_string();

    let mut send_task = tokio::spawn(send_loop(Arc::clone(connection), sink, receiver));
    let mut recv_task = tokio::spawn(recv_loop(state.clone(), Arc::clone(connection), stream));

    tokio::select! {
        result = &mut recv_task => {
            let reason = result.unwrap_or(CloseReason::TransportError);
            state.hub().disconnect(&connection_id, reason);
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
        _ = &mut send_task => {
            recv_task.abort();
            let reason = connection.close_reason().unwrap_or(CloseReason::TransportError);
            state.hub().disconnect(&connection_id, reason);
        }
    }

    tracing::debug!(connection_id = %connection_id, "WebSocket task finished");
}

/// Read client frames until the socket ends or breaks protocol
async fn recv_loop(
    state: GatewayState,
    connection: Arc<Connection>,
    mut stream: WsStream,
) -> CloseReason {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let frame = match GatewayMessage::decode(&text) {
                    Ok(frame) => frame,
                    Err(code) => {
                        tracing::debug!(
                            connection_id = %connection.id(),
                            close_code = %code,
                            "Undecodable frame"
                        );
                        return CloseReason::ProtocolViolation(code);
                    }
                };
                let dispatched =
                    MessageDispatcher::dispatch(state.connections(), &connection, &frame);
                if let Err(e) = dispatched {
                    return match e {
                        HandlerError::ConnectionClosed => CloseReason::TransportError,
                        other => CloseReason::ProtocolViolation(other.to_close_code()),
                    };
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!(connection_id = %connection.id(), "Binary messages not supported");
                return CloseReason::ProtocolViolation(CloseCode::DecodeError);
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                state.connections().touch(connection.id());
            }
            Ok(Message::Close(_)) => return CloseReason::ClientClosed,
            Err(e) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "WebSocket error");
                return CloseReason::TransportError;
            }
        }
    }
    CloseReason::ClientClosed
}

/// Forward queued frames to the socket until a close is signalled
async fn send_loop(
    connection: Arc<Connection>,
    mut sink: WsSink,
    mut receiver: mpsc::Receiver<GatewayMessage>,
) {
    let mut close_signal = connection.close_signal();

    loop {
        let pending = close_signal.borrow_and_update().clone();
        if let Some(reason) = pending {
            match reason.close_code() {
                Some(code) => close_with(&mut sink, code, &reason.message()).await,
                None => {
                    let _ = sink.close().await;
                }
            }
            return;
        }

        tokio::select! {
            biased;
            changed = close_signal.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            message = receiver.recv() => {
                let Some(message) = message else {
                    let _ = sink.close().await;
                    return;
                };
                if send_frame(&mut sink, &message).await.is_err() {
                    tracing::debug!(
                        connection_id = %connection.id(),
                        "Failed to write to WebSocket"
                    );
                    return;
                }
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, message: &GatewayMessage) -> Result<(), axum::Error> {
    let json = message.to_json().map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}

async fn close_with(sink: &mut WsSink, code: CloseCode, reason: &str) {
    let frame = CloseFrame {
        code: code.as_u16(),
        reason: Cow::Owned(truncate_reason(reason)),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}
