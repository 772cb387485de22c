//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct and its implementation,
//! providing the central orchestration of the accept loop, the session
//! registry, and shutdown coordination.

use crate::{
    config::ServerConfig,
    error::ServerError,
    registry::SessionRegistry,
    server::handlers::handle_connection,
    shutdown::ShutdownState,
};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// The core game server structure.
///
/// `GameServer` binds the listening socket, accepts connections, and spawns
/// one handler task per client. All session and game bookkeeping lives in
/// the [`SessionRegistry`]; the server itself carries no game state.
///
/// # Architecture
///
/// * **Session Registry**: correlation of sessions with games, join routing
/// * **Accept loop**: one task accepting connections until shutdown
/// * **Per-connection tasks**: one spawned `handle_connection` per client
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Canonical session and game bookkeeping
    registry: Arc<SessionRegistry>,

    /// Channel for coordinating internal server shutdown
    shutdown_sender: broadcast::Sender<()>,

    /// The address the listener actually bound to, for diagnostics and
    /// ephemeral-port setups
    local_addr: Arc<OnceLock<SocketAddr>>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// The server is ready to start after construction; nothing is bound
    /// until [`GameServer::start`] runs.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            config,
            registry: SessionRegistry::new(),
            shutdown_sender,
            local_addr: Arc::new(OnceLock::new()),
        }
    }

    /// Starts the server and begins accepting connections.
    ///
    /// Runs until an internal shutdown signal is received or the listener
    /// fails. Returns `Ok(())` on a clean stop.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_internal(None).await
    }

    /// Starts the server with graceful shutdown support.
    ///
    /// Every connection is admitted through `shutdown_state`, and the accept
    /// loop stops once it reports that draining has begun, allowing the
    /// application layer to wait for in-flight sessions before teardown.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        self.start_internal(Some(shutdown_state)).await
    }

    /// Internal method for starting the server with optional shutdown state.
    async fn start_internal(&self, shutdown_state: Option<ShutdownState>) -> Result<(), ServerError> {
        info!("🚀 Starting skirmish server on {}", self.config.bind_address);

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind listener: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Failed to read local address: {e}")))?;
        let _ = self.local_addr.set(local_addr);
        info!("🎮 Ready to accept connections on {}", local_addr);

        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        let accept_loop = {
            let registry = self.registry.clone();
            let config = self.config.clone();

            async move {
                loop {
                    if let Some(ref shutdown_state) = shutdown_state {
                        if shutdown_state.is_draining() {
                            info!("🛑 Accept loop stopping - drain initiated");
                            break;
                        }
                    }

                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            let registry = registry.clone();
                            let config = config.clone();
                            let shutdown_state = shutdown_state.clone();

                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, addr, registry, config, shutdown_state)
                                        .await
                                {
                                    error!("Connection error: {:?}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            break;
                        }
                    }
                }
            }
        };

        tokio::select! {
            _ = accept_loop => {}
            _ = shutdown_receiver.recv() => {
                info!("Internal shutdown signal received");
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Initiates server shutdown.
    ///
    /// Stops the registry (no further joins, unregister becomes a no-op)
    /// and signals the accept loop to stop.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        self.registry.shutdown();
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Gets a handle to the session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// The address the listener bound to, once the server has started.
    ///
    /// Useful when the configured bind address uses port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}
