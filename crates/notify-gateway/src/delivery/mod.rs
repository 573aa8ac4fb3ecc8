//! Delivery control plane
//!
//! The service backend callers use to reach connected clients, plus the bounded
//! queue that records what each call did.

mod queue;
mod service;
mod types;

pub use queue::{DeliveryEvent, DeliveryKind, DeliveryQueue, DeliveryStats};
pub use service::{DeliveryService, DEFAULT_DISCONNECT_REASON};
pub use types::{
    ConnectionStats, DisconnectOutcome, MembershipChange, MultiUserDelivery, RoomDelivery,
    RoomInfo, UserDelivery, UserPresence,
};
