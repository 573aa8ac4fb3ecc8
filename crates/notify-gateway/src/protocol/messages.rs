//! Gateway message format

use super::{CloseCode, HelloPayload, IdentifyPayload, OpCode, ReadyPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name of the dispatch sent after a successful handshake
pub const READY_EVENT: &str = "ready";

/// Gateway message format
///
/// All frames on both transports follow this envelope. Long-poll responses are a
/// JSON array of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Per-connection sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Create the `ready` dispatch for a freshly registered connection
    #[must_use]
    pub fn ready(sequence: u64, payload: &ReadyPayload) -> Self {
        Self::dispatch(
            READY_EVENT,
            sequence,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(payload: HelloPayload) -> Self {
        Self {
            op: OpCode::Hello,
            t: None,
            s: None,
            d: Some(serde_json::to_value(payload).unwrap_or_default()),
        }
    }

    /// Create a Heartbeat ACK message (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck,
            t: None,
            s: None,
            d: None,
        }
    }

    // === Parsing Client Messages ===

    /// Try to parse as an Identify payload (op=2)
    #[must_use]
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        if self.op != OpCode::Identify {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    // === Utilities ===

    #[must_use]
    pub fn is_valid_client_message(&self) -> bool {
        self.op.is_client_op()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Decode an inbound frame, classifying failures by close code
    ///
    /// # Errors
    /// `UnknownOpcode` for a well-formed frame with an op outside the protocol,
    /// `DecodeError` for anything else that does not parse.
    pub fn decode(text: &str) -> Result<Self, CloseCode> {
        Self::from_json(text).map_err(|_| {
            let op = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("op").and_then(Value::as_u64));
            match op {
                Some(op) if u8::try_from(op).ok().and_then(OpCode::from_u8).is_none() => {
                    CloseCode::UnknownOpcode
                }
                _ => CloseCode::DecodeError,
            }
        })
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
