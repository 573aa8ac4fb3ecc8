//! Identify handler (op 2)
//!
//! Only meaningful while a WebSocket is still authenticating.

use super::{HandlerError, HandlerResult};
use crate::protocol::{GatewayMessage, OpCode};

/// Handles frames received before the connection is authenticated
pub struct IdentifyHandler;

impl IdentifyHandler {
    /// Pull the credential out of a pre-authentication frame
    ///
    /// Heartbeats are tolerated while waiting and yield `None`; any other op is
    /// ignored the same way.
    pub fn credential(message: &GatewayMessage) -> HandlerResult<Option<String>> {
        match message.op {
            OpCode::Identify => message
                .as_identify()
                .map(|payload| Some(payload.token))
                .ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Identify payload".to_string())
                }),
            _ => Ok(None),
        }
    }
}
