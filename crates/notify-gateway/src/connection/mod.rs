//! Connection management
//!
//! Live connections, their registry, and admission control.

mod admission;
mod connection;
mod registry;

pub use admission::{ConnectionSlot, ConnectionSlots};
pub use connection::{CloseReason, Connection, ConnectionState, EmitError};
pub use registry::{ConnectionRegistry, RegistryStats};
