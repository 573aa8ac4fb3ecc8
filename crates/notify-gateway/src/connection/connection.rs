//! A single authenticated client connection
//!
//! Holds the identity resolved by the authentication gate, the transport it arrived
//! on, and the sending half of its bounded outbound queue.

use crate::protocol::{CloseCode, GatewayMessage};
use chrono::{DateTime, Utc};
use notify_common::TransportKind;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Connection lifecycle state
///
/// `Connecting` and `Authenticating` belong to the transport task before a
/// credential is accepted. A [`Connection`] is only built after that, so it starts
/// in `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, nothing read yet
    Connecting,
    /// Waiting for a credential
    Authenticating,
    /// Registered and receiving events
    Active,
    /// Disconnect triggered, registry cleanup in progress
    Disconnecting,
    /// Removed from every registry
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticating)
                | (Self::Authenticating, Self::Active)
                | (Self::Authenticating, Self::Closed)
                | (Self::Active, Self::Disconnecting)
                | (Self::Disconnecting, Self::Closed)
        )
    }
}

/// Why a connection is being torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the socket or deleted its poll session
    ClientClosed,
    /// Reading from or writing to the transport failed
    TransportError,
    /// No heartbeat within the configured timeout
    HeartbeatTimeout,
    /// The client broke the frame protocol
    ProtocolViolation(CloseCode),
    /// An operator asked for the disconnect
    Forced(String),
    /// The server is shutting down
    ServerShutdown,
}

impl CloseReason {
    /// Close code to send to the client, if the server initiated the close
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::ClientClosed | Self::TransportError => None,
            Self::HeartbeatTimeout => Some(CloseCode::SessionTimeout),
            Self::ProtocolViolation(code) => Some(*code),
            Self::Forced(_) | Self::ServerShutdown => Some(CloseCode::DisconnectedByServer),
        }
    }

    /// Human readable reason carried in the close frame
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ClientClosed => "client closed".to_string(),
            Self::TransportError => "transport error".to_string(),
            Self::HeartbeatTimeout => "heartbeat timeout".to_string(),
            Self::ProtocolViolation(code) => code.description().to_string(),
            Self::Forced(reason) => reason.clone(),
            Self::ServerShutdown => "server shutting down".to_string(),
        }
    }
}

/// Per-recipient send failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
}

/// A single authenticated connection
pub struct Connection {
    id: String,
    user_id: String,
    team_id: Option<String>,
    transport: TransportKind,
    connected_at: DateTime<Utc>,
    state: Mutex<ConnectionState>,
    last_seen: Mutex<Instant>,
    sequence: AtomicU64,
    sender: mpsc::Sender<GatewayMessage>,
    close_tx: watch::Sender<Option<CloseReason>>,
}

impl Connection {
    /// Create an active connection for an authenticated identity
    pub fn new(
        user_id: impl Into<String>,
        team_id: Option<String>,
        transport: TransportKind,
        sender: mpsc::Sender<GatewayMessage>,
    ) -> Arc<Self> {
        let (close_tx, _) = watch::channel(None);
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            team_id: team_id.filter(|t| !t.is_empty()),
            transport,
            connected_at: Utc::now(),
            state: Mutex::new(ConnectionState::Active),
            last_seen: Mutex::new(Instant::now()),
            sequence: AtomicU64::new(0),
            sender,
            close_tx,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Record client liveness
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the client was last heard from
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Get the next dispatch sequence number
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Queue a named event for this connection without waiting
    ///
    /// # Errors
    /// Returns `QueueFull` when the client is not draining its queue and `Closed`
    /// once the transport task has gone away.
    pub fn emit(&self, event_type: &str, data: Value) -> Result<u64, EmitError> {
        if !self.is_active() {
            return Err(EmitError::Closed);
        }
        let sequence = self.next_sequence();
        self.send(GatewayMessage::dispatch(event_type, sequence, data))?;
        Ok(sequence)
    }

    /// Queue a raw frame for this connection without waiting
    ///
    /// # Errors
    /// Same as [`Connection::emit`].
    pub fn send(&self, message: GatewayMessage) -> Result<(), EmitError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EmitError::Closed,
        })
    }

    /// Move to `Disconnecting` and wake the transport task
    ///
    /// Returns false if a disconnect is already under way, so only the first
    /// trigger's reason reaches the client.
    pub fn begin_disconnect(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock();
            if !state.can_transition_to(ConnectionState::Disconnecting) {
                return false;
            }
            *state = ConnectionState::Disconnecting;
        }
        self.close_tx.send_replace(Some(reason));
        true
    }

    /// Mark registry cleanup as complete
    pub fn mark_closed(&self) {
        let mut state = self.state.lock();
        if state.can_transition_to(ConnectionState::Closed) {
            *state = ConnectionState::Closed;
        }
    }

    /// Reason recorded by the first disconnect trigger
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_tx.borrow().clone()
    }

    /// Subscribe to the close signal
    ///
    /// The value turns `Some` once a disconnect has been triggered.
    #[must_use]
    pub fn close_signal(&self) -> watch::Receiver<Option<CloseReason>> {
        self.close_tx.subscribe()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("team_id", &self.team_id)
            .field("transport", &self.transport)
            .field("state", &self.state())
            .field("sequence", &self.current_sequence())
            .finish()
    }
}
