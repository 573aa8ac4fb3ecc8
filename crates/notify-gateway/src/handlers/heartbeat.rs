//! Heartbeat handler (op 1)

use super::{HandlerError, HandlerResult};
use crate::connection::{Connection, ConnectionRegistry, EmitError};
use crate::protocol::GatewayMessage;
use std::sync::Arc;

/// Handles heartbeat messages
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Record liveness and acknowledge
    ///
    /// A full outbound queue only costs the client its ack; the heartbeat itself
    /// still counts.
    pub fn handle(
        registry: &ConnectionRegistry,
        connection: &Arc<Connection>,
    ) -> HandlerResult<()> {
        registry.touch(connection.id());

        tracing::trace!(
            connection_id = %connection.id(),
            server_seq = connection.current_sequence(),
            "Heartbeat received"
        );

        match connection.send(GatewayMessage::heartbeat_ack()) {
            Ok(()) => Ok(()),
            Err(EmitError::QueueFull) => {
                tracing::warn!(connection_id = %connection.id(), "Heartbeat ACK dropped");
                Ok(())
            }
            Err(EmitError::Closed) => Err(HandlerError::ConnectionClosed),
        }
    }
}
