//! Control-plane result types
//!
//! These are returned by [`super::DeliveryService`] and serialized as the HTTP
//! response bodies of the control plane.

use crate::connection::RegistryStats;
use crate::rooms::{RoomSnapshot, RoomType};
use chrono::{DateTime, Utc};
use notify_common::TransportKind;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDelivery {
    /// At least one connection accepted the event
    pub delivered: bool,
    pub connection_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiUserDelivery {
    /// Distinct users addressed
    pub total_users: usize,
    /// Users with at least one connection that accepted the event
    pub delivered_count: usize,
    pub connections_by_user: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDelivery {
    pub delivered: bool,
    /// Room membership at call time, including members whose send failed
    pub recipient_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub is_connected: bool,
    pub connection_count: usize,
    pub connection_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total: usize,
    pub by_transport: BTreeMap<TransportKind, usize>,
    pub by_team: BTreeMap<String, usize>,
}

impl From<RegistryStats> for ConnectionStats {
    fn from(stats: RegistryStats) -> Self {
        Self {
            total: stats.total,
            by_transport: stats.by_transport,
            by_team: stats.by_team,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectOutcome {
    pub disconnected_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub room_id: String,
    /// Connections that joined or left as a result of the call
    pub affected_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_type: Option<RoomType>,
    pub member_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RoomInfo {
    #[must_use]
    pub fn missing(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            exists: false,
            room_type: None,
            member_count: 0,
            created_at: None,
        }
    }
}

impl From<RoomSnapshot> for RoomInfo {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            room_id: snapshot.room_id,
            exists: true,
            room_type: Some(snapshot.room_type),
            member_count: snapshot.member_count,
            created_at: Some(snapshot.created_at),
        }
    }
}
