//! Connection lifecycle
//!
//! Registers authenticated connections in both registries and tears them down
//! again. Every disconnect path, whether client close, heartbeat timeout, or forced,
//! goes through [`ConnectionHub::disconnect`].

use crate::auth::Identity;
use crate::connection::{CloseReason, Connection, ConnectionRegistry};
use crate::protocol::{GatewayMessage, ReadyPayload};
use crate::rooms::{team_room, user_room, RoomRegistry, RoomType};
use notify_common::{AppError, AppResult, TransportKind};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A freshly registered connection and the receiving end of its outbound queue
#[derive(Debug)]
pub struct Established {
    pub connection: Arc<Connection>,
    pub receiver: mpsc::Receiver<GatewayMessage>,
    pub rooms: Vec<String>,
}

/// Owns the connection lifecycle across both registries
#[derive(Debug)]
pub struct ConnectionHub {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    outbound_buffer: usize,
}

impl ConnectionHub {
    #[must_use]
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        rooms: Arc<RoomRegistry>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            connections,
            rooms,
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Register an authenticated identity and join its default rooms
    ///
    /// The `ready` frame is queued before the rooms are joined so it is always the
    /// first dispatch the client sees.
    ///
    /// # Errors
    /// Fails if the connection was disconnected before its rooms were joined.
    pub fn establish(
        &self,
        identity: Identity,
        transport: TransportKind,
    ) -> AppResult<Established> {
        let (sender, receiver) = mpsc::channel(self.outbound_buffer);
        let connection = Connection::new(identity.user_id, identity.team_id, transport, sender);
        let connection_id = connection.id().to_string();

        if !self.connections.add_connection(Arc::clone(&connection)) {
            return Err(AppError::internal(anyhow::anyhow!(
                "connection id {connection_id} already registered"
            )));
        }

        let mut rooms = vec![(user_room(connection.user_id()), RoomType::User)];
        if let Some(team_id) = connection.team_id() {
            rooms.push((team_room(team_id), RoomType::Team));
        }
        let room_ids: Vec<String> = rooms.iter().map(|(id, _)| id.clone()).collect();

        let ready = ReadyPayload {
            user_id: connection.user_id().to_string(),
            connection_id: connection_id.clone(),
            rooms: room_ids.clone(),
        };
        if let Err(e) = connection.send(GatewayMessage::ready(connection.next_sequence(), &ready)) {
            tracing::warn!(connection_id = %connection_id, error = %e, "Failed to queue ready");
        }

        for (room_id, room_type) in &rooms {
            self.rooms.join_room(&connection_id, room_id, *room_type);
        }

        // A disconnect that raced the joins above may have swept the rooms already
        if !connection.is_active() {
            self.rooms.leave_all_rooms(&connection_id);
            return Err(AppError::not_found(format!("connection {connection_id}")));
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %connection.user_id(),
            team_id = connection.team_id().unwrap_or(""),
            transport = %transport,
            "Connection established"
        );

        Ok(Established {
            connection,
            receiver,
            rooms: room_ids,
        })
    }

    /// Tear down a connection: signal its transport, unregister, leave all rooms
    ///
    /// Idempotent. Returns true only for the call that removed the connection.
    pub fn disconnect(&self, connection_id: &str, reason: CloseReason) -> bool {
        let Some(connection) = self.connections.get_connection(connection_id) else {
            return false;
        };

        connection.begin_disconnect(reason.clone());
        let removed = self.connections.remove_connection(connection_id).is_some();
        let rooms = self.rooms.leave_all_rooms(connection_id);
        connection.mark_closed();

        if removed {
            tracing::info!(
                connection_id = %connection_id,
                user_id = %connection.user_id(),
                reason = %reason.message(),
                rooms_left = rooms.len(),
                "Connection closed"
            );
        }
        removed
    }

    /// Disconnect every connection of a user, returning how many were closed
    pub fn disconnect_user(&self, user_id: &str, reason: &CloseReason) -> usize {
        self.connections
            .get_user_connections(user_id)
            .iter()
            .filter(|c| self.disconnect(c.id(), reason.clone()))
            .count()
    }

    /// Disconnect everything, used on shutdown
    pub fn disconnect_all(&self, reason: &CloseReason) -> usize {
        self.connections
            .all_connections()
            .iter()
            .filter(|c| self.disconnect(c.id(), reason.clone()))
            .count()
    }
}
