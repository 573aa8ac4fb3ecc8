//! Delivery control plane
//!
//! Synchronous entry points used by backend services to push events to users and
//! rooms and to inspect or manage live connections. Every call validates its
//! arguments before touching a registry and returns as soon as each frame has been
//! handed to its connection's outbound queue.

use super::queue::{DeliveryEvent, DeliveryKind, DeliveryQueue, DeliveryStats};
use super::types::{
    ConnectionStats, DisconnectOutcome, MembershipChange, MultiUserDelivery, RoomDelivery,
    RoomInfo, UserDelivery, UserPresence,
};
use crate::connection::{CloseReason, Connection, ConnectionRegistry};
use crate::hub::ConnectionHub;
use crate::rooms::{user_room, RoomRegistry, RoomType};
use notify_common::{AppError, AppResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Reason used when a disconnect request does not supply one
pub const DEFAULT_DISCONNECT_REASON: &str = "disconnected by server";

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_argument(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Control-plane operations over the connection and room registries
#[derive(Debug)]
pub struct DeliveryService {
    hub: Arc<ConnectionHub>,
    queue: Arc<DeliveryQueue>,
}

impl DeliveryService {
    #[must_use]
    pub fn new(hub: Arc<ConnectionHub>, queue: Arc<DeliveryQueue>) -> Self {
        Self { hub, queue }
    }

    fn connections(&self) -> &ConnectionRegistry {
        self.hub.connections()
    }

    fn rooms(&self) -> &RoomRegistry {
        self.hub.rooms()
    }

    /// Emit to each member connection, returning how many accepted the frame
    ///
    /// A failure on one member is logged and never affects the others.
    fn fan_out(&self, members: &[String], event_type: &str, payload: &Value) -> usize {
        members
            .iter()
            .filter(|connection_id| {
                let Some(connection) = self.connections().get_connection(connection_id) else {
                    tracing::debug!(connection_id = %connection_id, "Member no longer registered");
                    return false;
                };
                match connection.emit(event_type, payload.clone()) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            user_id = %connection.user_id(),
                            event_type = %event_type,
                            error = %e,
                            "Send to connection failed"
                        );
                        false
                    }
                }
            })
            .count()
    }

    /// Send an event to every connection of a user
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty user id or event type.
    pub fn send_to_user(
        &self,
        user_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> AppResult<UserDelivery> {
        require("userId", user_id)?;
        require("eventType", event_type)?;

        let members = self.rooms().get_room_members(&user_room(user_id));
        let sent = self.fan_out(&members, event_type, payload);

        self.queue.record(DeliveryEvent::new(
            DeliveryKind::User,
            user_id,
            Some(event_type),
            members.len(),
            sent,
        ));

        Ok(UserDelivery {
            delivered: sent > 0,
            connection_count: members.len(),
        })
    }

    /// Send an event to several users independently
    ///
    /// Duplicate ids are addressed once. Every id is validated before anything is
    /// sent.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty list, an empty id, or an empty event type.
    pub fn send_to_users(
        &self,
        user_ids: &[String],
        event_type: &str,
        payload: &Value,
    ) -> AppResult<MultiUserDelivery> {
        if user_ids.is_empty() {
            return Err(AppError::invalid_argument("userIds must not be empty"));
        }
        for user_id in user_ids {
            require("userIds[]", user_id)?;
        }
        require("eventType", event_type)?;

        let mut seen = HashSet::new();
        let mut connections_by_user = BTreeMap::new();
        let mut delivered_count = 0;
        let mut recipients = 0;
        let mut sent_total = 0;

        for user_id in user_ids.iter().filter(|id| seen.insert(id.as_str())) {
            let members = self.rooms().get_room_members(&user_room(user_id));
            let sent = self.fan_out(&members, event_type, payload);
            if sent > 0 {
                delivered_count += 1;
            }
            recipients += members.len();
            sent_total += sent;
            connections_by_user.insert(user_id.clone(), members.len());
        }

        self.queue.record(DeliveryEvent::new(
            DeliveryKind::Users,
            connections_by_user.keys().cloned().collect::<Vec<_>>().join(","),
            Some(event_type),
            recipients,
            sent_total,
        ));

        Ok(MultiUserDelivery {
            total_users: connections_by_user.len(),
            delivered_count,
            connections_by_user,
        })
    }

    /// Send an event to every member of a room
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty room id or event type.
    pub fn broadcast_to_room(
        &self,
        room_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> AppResult<RoomDelivery> {
        require("roomId", room_id)?;
        require("eventType", event_type)?;

        let members = self.rooms().get_room_members(room_id);
        let sent = self.fan_out(&members, event_type, payload);

        self.queue.record(DeliveryEvent::new(
            DeliveryKind::Room,
            room_id,
            Some(event_type),
            members.len(),
            sent,
        ));

        Ok(RoomDelivery {
            delivered: sent > 0,
            recipient_count: members.len(),
        })
    }

    /// Report whether a user has live connections
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty user id.
    pub fn is_user_connected(&self, user_id: &str) -> AppResult<UserPresence> {
        require("userId", user_id)?;

        let connection_ids: Vec<String> = self
            .connections()
            .get_user_connections(user_id)
            .iter()
            .map(|c| c.id().to_string())
            .collect();

        Ok(UserPresence {
            is_connected: !connection_ids.is_empty(),
            connection_count: connection_ids.len(),
            connection_ids,
        })
    }

    /// Connection counts, optionally restricted to one team
    #[must_use]
    pub fn get_connection_stats(&self, team_id: Option<&str>) -> ConnectionStats {
        let team_id = team_id.map(str::trim).filter(|t| !t.is_empty());
        self.connections().stats(team_id).into()
    }

    /// Force every connection of a user closed
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty user id.
    pub fn disconnect_user(
        &self,
        user_id: &str,
        reason: Option<&str>,
    ) -> AppResult<DisconnectOutcome> {
        require("userId", user_id)?;

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_DISCONNECT_REASON);
        let disconnected_count = self
            .hub
            .disconnect_user(user_id, &CloseReason::Forced(reason.to_string()));

        self.queue.record(DeliveryEvent::new(
            DeliveryKind::Disconnect,
            user_id,
            None,
            disconnected_count,
            disconnected_count,
        ));

        Ok(DisconnectOutcome { disconnected_count })
    }

    fn require_custom_room(room_id: &str) -> AppResult<()> {
        require("roomId", room_id)?;
        if RoomType::from_room_id(room_id) != RoomType::Custom {
            return Err(AppError::invalid_argument(format!(
                "room {room_id} is managed by the gateway"
            )));
        }
        Ok(())
    }

    /// Join every live connection of a user to a custom room
    ///
    /// # Errors
    /// Returns `InvalidArgument` for empty ids or a `user:`/`team:` room.
    pub fn join_user_to_room(&self, user_id: &str, room_id: &str) -> AppResult<MembershipChange> {
        require("userId", user_id)?;
        Self::require_custom_room(room_id)?;

        let affected_connections = self
            .connections()
            .get_user_connections(user_id)
            .iter()
            .filter(|c| self.join_if_active(c, room_id))
            .count();

        tracing::debug!(
            user_id = %user_id,
            room_id = %room_id,
            affected_connections,
            "User joined room"
        );

        Ok(MembershipChange {
            room_id: room_id.to_string(),
            affected_connections,
        })
    }

    /// Join one connection to a custom room unless it is already disconnecting
    ///
    /// A disconnect may sweep the connection's rooms between the snapshot and the
    /// join; the membership is undone so no dead id is left behind.
    fn join_if_active(&self, connection: &Connection, room_id: &str) -> bool {
        let joined = self
            .rooms()
            .join_room(connection.id(), room_id, RoomType::Custom);
        if !connection.is_active() {
            self.rooms().leave_room(connection.id(), room_id);
            return false;
        }
        joined
    }

    /// Remove every live connection of a user from a custom room
    ///
    /// # Errors
    /// Returns `InvalidArgument` for empty ids or a `user:`/`team:` room.
    pub fn remove_user_from_room(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> AppResult<MembershipChange> {
        require("userId", user_id)?;
        Self::require_custom_room(room_id)?;

        let affected_connections = self
            .connections()
            .get_user_connections(user_id)
            .iter()
            .filter(|c| self.rooms().leave_room(c.id(), room_id))
            .count();

        Ok(MembershipChange {
            room_id: room_id.to_string(),
            affected_connections,
        })
    }

    /// Describe a room; a missing room is reported, not an error
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty room id.
    pub fn get_room(&self, room_id: &str) -> AppResult<RoomInfo> {
        require("roomId", room_id)?;

        Ok(self
            .rooms()
            .get_room(room_id)
            .map_or_else(|| RoomInfo::missing(room_id), RoomInfo::from))
    }

    #[must_use]
    pub fn delivery_stats(&self) -> DeliveryStats {
        self.queue.stats()
    }
}
