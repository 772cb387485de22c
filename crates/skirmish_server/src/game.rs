//! Game rooms: bounded two-team membership and broadcast fan-out.
//!
//! A [`Game`] is a named shared context for up to two teams of five sessions.
//! Joined sessions have the game's broadcast handler installed, so every
//! frame a member sends is fanned out to all members. The game holds
//! reference-counted session handles keyed by [`SessionId`]; session
//! lifetime is owned by the registry.

use crate::player::PlayerState;
use crate::session::{InboundHandler, Session, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::trace;

/// Maximum number of players that can be assigned to one team.
pub const MAX_PLAYERS_PER_TEAM: usize = 5;

/// One of the two bounded teams within a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    A,
    B,
}

/// Team selection carried by a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamSelect {
    /// Join team A explicitly
    A,
    /// Join team B explicitly
    B,
    /// Join the smaller team, ties broken toward team A
    Random,
}

/// Why a join was refused. No state changes on refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The selected team is at capacity (for `Random`: the smaller team is)
    Full,
    /// The session is already a member of this game
    AlreadyJoined,
}

/// What a successful join hands back to the caller.
pub struct JoinSuccess {
    /// The game's broadcast handler, to be installed on the session
    pub handler: InboundHandler,

    /// JSON snapshot of every player currently in the game
    pub snapshot: Vec<serde_json::Value>,

    /// The id assigned to the new player, unique within this game
    pub player_id: u64,
}

type TeamRoster = HashMap<SessionId, (Arc<Session>, PlayerState)>;

/// A named room whose members exchange broadcast frames.
///
/// # Lock discipline
///
/// Team A's lock is always acquired before team B's when both are needed;
/// the players-cache lock is only ever taken after any team locks are
/// released or while none are held.
pub struct Game {
    /// Room name, the key under which the registry holds this game
    name: String,

    team_a: RwLock<TeamRoster>,
    team_b: RwLock<TeamRoster>,

    /// Membership cache; agrees with the union of both rosters
    players: RwLock<HashMap<SessionId, Team>>,

    /// Source of per-game player ids
    next_player_id: AtomicU64,

    /// Handler installed on joined sessions; forwards every frame to
    /// [`Game::broadcast`]
    broadcast_handler: InboundHandler,
}

impl Game {
    /// Creates an empty game with the given room name.
    ///
    /// The broadcast handler is bound here with a weak self-reference so a
    /// dying game cannot be kept alive by the sessions it once served.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Game>| {
            let handler_game = weak.clone();
            let broadcast_handler: InboundHandler = Arc::new(move |frame, _session| {
                let game = handler_game.clone();
                Box::pin(async move {
                    if let Some(game) = game.upgrade() {
                        game.broadcast(frame).await;
                    }
                })
            });

            Self {
                name: name.into(),
                team_a: RwLock::new(HashMap::new()),
                team_b: RwLock::new(HashMap::new()),
                players: RwLock::new(HashMap::new()),
                next_player_id: AtomicU64::new(1),
                broadcast_handler,
            }
        })
    }

    /// Returns the room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds the session to this game on the selected team.
    ///
    /// An explicit team choice fails with [`JoinError::Full`] when that team
    /// is at capacity; a `Random` choice targets the smaller team (ties
    /// toward A) and does not spill to the other team when it is full.
    /// A session already in the game is refused without any state change.
    pub async fn join(
        &self,
        session: &Arc<Session>,
        nick: &str,
        team: TeamSelect,
    ) -> Result<JoinSuccess, JoinError> {
        if self.players.read().await.contains_key(&session.id()) {
            return Err(JoinError::AlreadyJoined);
        }

        let (side, player_id) = match team {
            TeamSelect::A => {
                let mut roster = self.team_a.write().await;
                (Team::A, self.insert_player(&mut roster, Team::A, session, nick)?)
            }
            TeamSelect::B => {
                let mut roster = self.team_b.write().await;
                (Team::B, self.insert_player(&mut roster, Team::B, session, nick)?)
            }
            TeamSelect::Random => {
                let mut team_a = self.team_a.write().await;
                let mut team_b = self.team_b.write().await;
                if team_a.len() > team_b.len() {
                    (Team::B, self.insert_player(&mut team_b, Team::B, session, nick)?)
                } else {
                    (Team::A, self.insert_player(&mut team_a, Team::A, session, nick)?)
                }
            }
        };

        self.players.write().await.insert(session.id(), side);
        trace!(
            "Player {} ({}) joined game {} on team {:?}",
            player_id,
            nick,
            self.name,
            side
        );

        Ok(JoinSuccess {
            handler: self.broadcast_handler.clone(),
            snapshot: self.snapshot().await,
            player_id,
        })
    }

    fn insert_player(
        &self,
        roster: &mut TeamRoster,
        side: Team,
        session: &Arc<Session>,
        nick: &str,
    ) -> Result<u64, JoinError> {
        if roster.len() >= MAX_PLAYERS_PER_TEAM {
            return Err(JoinError::Full);
        }
        let player_id = self.next_player_id.fetch_add(1, Ordering::Relaxed);
        roster.insert(
            session.id(),
            (Arc::clone(session), PlayerState::new(player_id, nick, side)),
        );
        Ok(player_id)
    }

    /// Removes the session from whichever team holds it.
    ///
    /// Returns true if it was a member. Does not close the session.
    pub async fn leave(&self, id: SessionId) -> bool {
        let removed = {
            let mut team_a = self.team_a.write().await;
            if team_a.remove(&id).is_some() {
                true
            } else {
                drop(team_a);
                self.team_b.write().await.remove(&id).is_some()
            }
        };
        if removed {
            self.players.write().await.remove(&id);
            trace!("Session {} left game {}", id, self.name);
        }
        removed
    }

    /// Fans the frame out to every member of both teams.
    ///
    /// Each member's outbound queue preserves its own ordering; no ordering
    /// across members is promised.
    pub async fn broadcast(&self, frame: Utf8Bytes) {
        {
            let team_a = self.team_a.read().await;
            for (session, _) in team_a.values() {
                session.write(frame.clone());
            }
        }
        {
            let team_b = self.team_b.read().await;
            for (session, _) in team_b.values() {
                session.write(frame.clone());
            }
        }
    }

    /// Total number of players across both teams.
    pub async fn player_count(&self) -> usize {
        let count = self.team_a.read().await.len();
        count + self.team_b.read().await.len()
    }

    /// Encodes the current state of every player, team A first.
    pub async fn snapshot(&self) -> Vec<serde_json::Value> {
        let mut players = Vec::new();
        {
            let team_a = self.team_a.read().await;
            players.extend(team_a.values().map(|(_, player)| player.to_json()));
        }
        {
            let team_b = self.team_b.read().await;
            players.extend(team_b.values().map(|(_, player)| player.to_json()));
        }
        players
    }

    /// Which team the session is on, if it is a member.
    pub async fn team_of(&self, id: SessionId) -> Option<Team> {
        self.players.read().await.get(&id).copied()
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game").field("name", &self.name).finish()
    }
}
