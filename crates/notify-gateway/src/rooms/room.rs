//! Room records and room id conventions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

const USER_PREFIX: &str = "user:";
const TEAM_PREFIX: &str = "team:";

/// Personal room of a user
#[must_use]
pub fn user_room(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Shared room of a team
#[must_use]
pub fn team_room(team_id: &str) -> String {
    format!("{TEAM_PREFIX}{team_id}")
}

/// Kind of room, derived from how it was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    User,
    Team,
    Custom,
}

impl RoomType {
    /// Classify a room id by its reserved prefix
    #[must_use]
    pub fn from_room_id(room_id: &str) -> Self {
        if room_id.starts_with(USER_PREFIX) {
            Self::User
        } else if room_id.starts_with(TEAM_PREFIX) {
            Self::Team
        } else {
            Self::Custom
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Team => "team",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room and its member connection ids
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub room_type: RoomType,
    pub members: HashSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    #[must_use]
    pub fn new(id: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            id: id.into(),
            room_type,
            members: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            room_type: self.room_type,
            member_count: self.members.len(),
            created_at: self.created_at,
        }
    }
}

/// Point-in-time view of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub room_type: RoomType,
    pub member_count: usize,
    pub created_at: DateTime<Utc>,
}
