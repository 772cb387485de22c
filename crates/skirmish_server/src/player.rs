//! Player state carried by a game for each joined session.
//!
//! The core does not interpret player state beyond its identity; the struct
//! is serialized as-is into game snapshots sent to clients.

use crate::game::Team;
use serde::Serialize;

/// Per-session player state inside a game.
///
/// Created at join time and dropped when the session leaves. The `id` is
/// unique within the owning game and is the value reported to the client
/// as `my_id` in the join reply.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerState {
    /// Player id, unique within the owning game
    pub id: u64,

    /// Nickname supplied by the client at join time
    pub nick: String,

    /// The team this player was assigned to
    pub team: Team,

    /// Remaining health points
    pub health: u32,

    /// Position on the playfield
    pub position: [f32; 2],

    /// Facing angle in radians
    pub angle: f32,
}

impl PlayerState {
    /// Creates a fresh player at the spawn position.
    pub fn new(id: u64, nick: &str, team: Team) -> Self {
        Self {
            id,
            nick: nick.to_string(),
            team,
            health: 100,
            position: [0.0, 0.0],
            angle: 0.0,
        }
    }

    /// Encodes this player as the JSON object carried in game snapshots.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
