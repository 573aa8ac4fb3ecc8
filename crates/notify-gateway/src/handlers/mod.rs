//! Op code handlers
//!
//! Handles frames a client sends over an established WebSocket.

mod error;
mod heartbeat;
mod identify;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use identify::IdentifyHandler;

use crate::connection::{Connection, ConnectionRegistry};
use crate::protocol::{GatewayMessage, OpCode};
use std::sync::Arc;

/// Dispatch incoming client messages to appropriate handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle a client frame on an authenticated connection
    ///
    /// Ops a client may not send are ignored.
    pub fn dispatch(
        registry: &ConnectionRegistry,
        connection: &Arc<Connection>,
        message: &GatewayMessage,
    ) -> HandlerResult<()> {
        match message.op {
            OpCode::Heartbeat => HeartbeatHandler::handle(registry, connection),
            OpCode::Identify => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    "Client sent Identify while already authenticated"
                );
                Err(HandlerError::AlreadyAuthenticated)
            }
            op => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    op = %op,
                    "Ignoring client frame"
                );
                Ok(())
            }
        }
    }
}
