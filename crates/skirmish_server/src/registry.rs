//! Session registry: correlates sessions with games and drives joins.
//!
//! The registry owns the canonical references to all live sessions and
//! games. A session registers as "unidentified" and stays that way until a
//! successful join moves it into a game; the registry then swaps the
//! session's inbound handler for the game's broadcast handler. Teardown runs
//! the other way through [`SessionRegistry::unregister`], and the last
//! leaver of a game removes the game itself.
//!
//! Lock discipline: the registry's three locks are only ever held one at a
//! time, released in the order correlation, unidentified, games.

use crate::game::{Game, JoinError, TeamSelect};
use crate::messaging::{ClientRequest, ServerReply};
use crate::session::{InboundHandler, Session, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::{debug, error, info, trace, warn};

/// Process-wide session and game bookkeeping.
///
/// Construct once with [`SessionRegistry::new`] and share by reference with
/// the acceptor and the per-connection handlers.
pub struct SessionRegistry {
    /// Sessions that have registered but not yet joined any game
    unidentified: RwLock<HashMap<SessionId, Arc<Session>>>,

    /// Active games by room name; created on demand, removed by the last leaver
    games: RwLock<HashMap<String, Arc<Game>>>,

    /// Every registered session and the game it has joined, if any.
    /// `None` means the session is still unidentified.
    correlation: RwLock<HashMap<SessionId, Option<String>>>,

    /// Once set, joins are refused and unregister becomes a no-op
    stopped: AtomicBool,

    /// Handler installed on sessions that have not joined a game yet
    unjoined_handler: InboundHandler,
}

impl SessionRegistry {
    /// Creates the registry and binds its unjoined handler.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SessionRegistry>| {
            let handler_registry = weak.clone();
            let unjoined_handler: InboundHandler = Arc::new(move |frame, session| {
                let registry = handler_registry.clone();
                Box::pin(async move {
                    if let Some(registry) = registry.upgrade() {
                        registry.handle_unjoined_frame(frame, session).await;
                    }
                })
            });

            Self {
                unidentified: RwLock::new(HashMap::new()),
                games: RwLock::new(HashMap::new()),
                correlation: RwLock::new(HashMap::new()),
                stopped: AtomicBool::new(false),
                unjoined_handler,
            }
        })
    }

    /// Registers a new session and returns the handler to install on it.
    ///
    /// A session that is already registered is left untouched; the same
    /// unjoined handler is returned so the caller can proceed either way.
    pub async fn register(&self, session: &Arc<Session>) -> InboundHandler {
        {
            let mut correlation = self.correlation.write().await;
            if correlation.contains_key(&session.id()) {
                warn!(
                    "Second registration of session {} ({})",
                    session.id(),
                    session.remote_addr()
                );
                return self.unjoined_handler.clone();
            }
            correlation.insert(session.id(), None);
        }

        self.unidentified
            .write()
            .await
            .insert(session.id(), Arc::clone(session));

        debug!(
            "New session {} registered ({})",
            session.id(),
            session.remote_addr()
        );
        self.unjoined_handler.clone()
    }

    /// Removes a session from the registry and from its game, if any.
    ///
    /// Idempotent: unregistering an unknown session only logs a warning.
    /// After [`SessionRegistry::shutdown`] this is a no-op so that sessions
    /// draining during teardown cannot race the registry state.
    pub async fn unregister(&self, id: SessionId) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let game_name = {
            let mut correlation = self.correlation.write().await;
            match correlation.remove(&id) {
                Some(game_name) => game_name,
                None => {
                    warn!("Tried to unregister session {} which is not registered", id);
                    return;
                }
            }
        };

        match game_name {
            None => {
                self.unidentified.write().await.remove(&id);
                debug!("Unregistered session {}", id);
            }
            Some(name) => {
                debug!("Removing session {} from game {}", id, name);
                let mut games = self.games.write().await;
                if let Some(game) = games.get(&name).cloned() {
                    game.leave(id).await;
                    if game.player_count().await == 0 {
                        debug!("Game {} has no players left, removing", name);
                        games.remove(&name);
                    }
                }
            }
        }
    }

    /// Stops the registry: no further joins, unregister becomes a no-op.
    ///
    /// Remaining cleanup is left to process exit.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Returns true once [`SessionRegistry::shutdown`] has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of registered sessions, joined or not.
    pub async fn session_count(&self) -> usize {
        self.correlation.read().await.len()
    }

    /// Number of active games.
    pub async fn game_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Looks up an active game by room name.
    pub async fn game(&self, name: &str) -> Option<Arc<Game>> {
        self.games.read().await.get(name).cloned()
    }

    /// The unjoined handler: parses requests from not-yet-joined sessions.
    ///
    /// Must never block beyond brief lock acquisitions; every reply goes out
    /// through the session's ordered write queue.
    async fn handle_unjoined_frame(&self, frame: Utf8Bytes, session: Arc<Session>) {
        if self.stopped.load(Ordering::Acquire) {
            debug!(
                "Dropping frame from session {}: registry is stopped",
                session.id()
            );
            return;
        }

        trace!("Received a frame from unjoined session {}", session.id());

        let reply = match serde_json::from_str::<ClientRequest>(frame.as_str()) {
            Ok(ClientRequest::Join { game, nick }) => {
                self.handle_join(&session, game, &nick).await
            }
            Err(_) => {
                warn!(
                    "Received an unidentified package from session {} ({})",
                    session.id(),
                    session.remote_addr()
                );
                ServerReply::unidentified_warning()
            }
        };

        match reply.encode() {
            Ok(text) => session.write(text),
            Err(e) => error!("Failed to encode reply for session {}: {}", session.id(), e),
        }
    }

    /// Looks up or creates the named game and joins the session to it.
    async fn handle_join(
        &self,
        session: &Arc<Session>,
        game_name: String,
        nick: &str,
    ) -> ServerReply {
        let game = {
            let mut games = self.games.write().await;
            games
                .entry(game_name.clone())
                .or_insert_with(|| Game::new(game_name.clone()))
                .clone()
        };

        match game.join(session, nick, TeamSelect::Random).await {
            Err(JoinError::Full) => {
                debug!(
                    "Session {} could not join game {}: game is full",
                    session.id(),
                    game_name
                );
                ServerReply::join_full()
            }
            Err(JoinError::AlreadyJoined) => {
                warn!(
                    "Session {} attempted to join game {} twice",
                    session.id(),
                    game_name
                );
                ServerReply::join_full()
            }
            Ok(join) => {
                session.install_handler(join.handler).await;
                self.unidentified.write().await.remove(&session.id());
                self.correlation
                    .write()
                    .await
                    .insert(session.id(), Some(game_name.clone()));

                info!(
                    "🎮 Session {} joined game {} as player {}",
                    session.id(),
                    game_name,
                    join.player_id
                );
                ServerReply::joined(join.player_id, join.snapshot)
            }
        }
    }

    /// The correlation entry for a session: absent, unidentified, or joined.
    #[cfg(test)]
    pub(crate) async fn correlation_of(&self, id: SessionId) -> Option<Option<String>> {
        self.correlation.read().await.get(&id).cloned()
    }

    /// Whether the session is in the unidentified set.
    #[cfg(test)]
    pub(crate) async fn is_unidentified(&self, id: SessionId) -> bool {
        self.unidentified.read().await.contains_key(&id)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}
