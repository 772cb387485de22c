//! # Skirmish Server - Core Infrastructure
//!
//! Core library for a multiplayer real-time game server. Clients connect
//! over WebSocket, join named game rooms in one of two bounded teams, and
//! exchange broadcast frames with the other members of their room.
//!
//! ## Architecture Overview
//!
//! * **Session** - one per connected client; owns the WebSocket, an ordered
//!   outbound queue drained by a single writer task, and a swappable inbound
//!   handler dispatched serially by the read loop
//! * **Game** - one per active room; two teams of at most five sessions,
//!   per-session player state, and broadcast fan-out
//! * **SessionRegistry** - correlates sessions with games, parses join
//!   requests from unjoined sessions, and destroys empty games
//! * **GameServer** - binds the listener and spawns one handler per client
//!
//! ## Message Flow
//!
//! 1. Client connects; the accept loop registers a new session
//! 2. The session's frames are parsed by the registry's unjoined handler
//! 3. A `join` request places the session into a game and swaps its inbound
//!    handler for the game's broadcast handler
//! 4. Every subsequent frame is fanned out, uninterpreted, to all members
//!    of the room
//!
//! ## Wire Protocol
//!
//! Text frames carrying JSON objects with a `type` field:
//!
//! ```json
//! {"type":"join","game":"alpha","nick":"ripley"}
//! ```
//!
//! answered by `join-result` (`joined` with `my_id` and a `players` snapshot,
//! or `full`) or by a `warning` frame for unrecognized requests.
//!
//! ## Ordering Guarantees
//!
//! * Per session, outbound frames reach the wire in enqueue order with at
//!   most one write in flight
//! * Per session, inbound frames dispatch to the installed handler in
//!   arrival order, never concurrently
//! * Broadcasts are fan-outs; no ordering across sessions is promised

// Re-export core types and functions for easy access
pub use config::ServerConfig;
pub use error::ServerError;
pub use game::{Game, JoinError, JoinSuccess, Team, TeamSelect, MAX_PLAYERS_PER_TEAM};
pub use player::PlayerState;
pub use registry::SessionRegistry;
pub use server::GameServer;
pub use session::{InboundHandler, Session, SessionId};
pub use shutdown::{SessionTicket, ShutdownState};

// Public module declarations
pub mod config;
pub mod error;
pub mod game;
pub mod messaging;
pub mod player;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;

// Internal modules (not part of public API)
mod tests;
