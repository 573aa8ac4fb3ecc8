//! # notify-gateway
//!
//! Real-time notification gateway. Clients hold WebSocket or long-poll connections;
//! backend services push events to users and rooms through the delivery control plane.

pub mod api;
pub mod auth;
pub mod connection;
pub mod delivery;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod protocol;
pub mod rooms;
pub mod server;

pub use delivery::DeliveryService;
pub use hub::{ConnectionHub, Established};
pub use server::{create_app, run, serve, shutdown_signal, GatewayState};
