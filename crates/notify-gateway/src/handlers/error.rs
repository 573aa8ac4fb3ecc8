//! Handler error types

use crate::protocol::CloseCode;
use thiserror::Error;

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Frame parsed but its payload did not match the op code
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Identify arrived on a connection that is already registered
    #[error("Already authenticated")]
    AlreadyAuthenticated,

    /// The connection's outbound queue has gone away
    #[error("Connection closed")]
    ConnectionClosed,
}

impl HandlerError {
    /// Close code to end the connection with
    #[must_use]
    pub fn to_close_code(&self) -> CloseCode {
        match self {
            Self::InvalidPayload(_) => CloseCode::DecodeError,
            Self::AlreadyAuthenticated => CloseCode::AlreadyAuthenticated,
            Self::ConnectionClosed => CloseCode::UnknownError,
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
