//! Integration test utilities for the notification gateway
//!
//! Spawns an in-process gateway on an ephemeral port and drives it with real
//! WebSocket and HTTP clients.

pub mod fixtures;

pub use fixtures::*;
pub use helpers::*;
