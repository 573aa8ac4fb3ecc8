//! Rooms
//!
//! Named groups of connections used as broadcast targets.

mod registry;
mod room;

pub use registry::RoomRegistry;
pub use room::{team_room, user_room, Room, RoomSnapshot, RoomType};
