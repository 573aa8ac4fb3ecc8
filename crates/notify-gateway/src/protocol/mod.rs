//! Gateway protocol definitions
//!
//! Op codes, the frame envelope, payloads, and close codes shared by both transports.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use messages::{GatewayMessage, READY_EVENT};
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, ReadyPayload};
