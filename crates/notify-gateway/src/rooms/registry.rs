//! Room registry
//!
//! Rooms keyed by id plus a reverse index from connection to rooms. Both maps live
//! under one `RwLock`; a room is created on first join and dropped when its last
//! member leaves.

use super::{Room, RoomSnapshot, RoomType};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct Rooms {
    rooms: HashMap<String, Room>,
    memberships: HashMap<String, HashSet<String>>,
}

impl Rooms {
    fn leave(&mut self, connection_id: &str, room_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = room.members.remove(connection_id);
        if room.members.is_empty() {
            self.rooms.remove(room_id);
            tracing::trace!(room_id = %room_id, "Room removed");
        }
        removed
    }
}

/// Registry of rooms and their member connections
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Rooms>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a connection to a room, creating the room on first use
    ///
    /// Returns true if the connection was not already a member. The type of an
    /// existing room is never changed.
    pub fn join_room(&self, connection_id: &str, room_id: &str, room_type: RoomType) -> bool {
        let mut inner = self.inner.write();
        let joined = inner
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id, room_type))
            .members
            .insert(connection_id.to_string());
        if joined {
            inner
                .memberships
                .entry(connection_id.to_string())
                .or_default()
                .insert(room_id.to_string());
        }
        drop(inner);

        if joined {
            tracing::trace!(connection_id = %connection_id, room_id = %room_id, "Joined room");
        }
        joined
    }

    /// Remove a connection from a room; returns true if it was a member
    pub fn leave_room(&self, connection_id: &str, room_id: &str) -> bool {
        let mut inner = self.inner.write();
        let left = inner.leave(connection_id, room_id);
        if let Some(rooms) = inner.memberships.get_mut(connection_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                inner.memberships.remove(connection_id);
            }
        }
        left
    }

    /// Remove a connection from every room it belongs to, returning those rooms
    pub fn leave_all_rooms(&self, connection_id: &str) -> Vec<String> {
        let mut inner = self.inner.write();
        let Some(rooms) = inner.memberships.remove(connection_id) else {
            return Vec::new();
        };
        let mut left: Vec<String> = rooms
            .into_iter()
            .filter(|room_id| inner.leave(connection_id, room_id))
            .collect();
        left.sort();
        left
    }

    /// Member connection ids of a room; empty for unknown rooms
    #[must_use]
    pub fn get_room_members(&self, room_id: &str) -> Vec<String> {
        self.inner
            .read()
            .rooms
            .get(room_id)
            .map(|room| room.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn member_count(&self, room_id: &str) -> usize {
        self.inner
            .read()
            .rooms
            .get(room_id)
            .map_or(0, |room| room.members.len())
    }

    /// Rooms a connection belongs to, sorted
    #[must_use]
    pub fn rooms_for(&self, connection_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .inner
            .read()
            .memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    #[must_use]
    pub fn get_room(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.inner.read().rooms.get(room_id).map(Room::snapshot)
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("RoomRegistry")
            .field("rooms", &inner.rooms.len())
            .field("members", &inner.memberships.len())
            .finish()
    }
}
