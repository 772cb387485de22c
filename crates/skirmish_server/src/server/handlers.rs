//! Connection handling logic for WebSocket clients.
//!
//! This module contains the core connection handling logic that manages
//! the lifecycle of individual client connections, from registration through
//! the session's read loop to cleanup.

use crate::{
    config::ServerConfig, error::ServerError, registry::SessionRegistry, session::Session,
    shutdown::ShutdownState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Ask the drain state for admission; a draining server refuses
/// 2. Enforce the configured connection limit
/// 3. Create the session and register it with the registry
/// 4. Install the registry's unjoined handler on the session
/// 5. Run the session (WebSocket handshake, writer task, read loop)
/// 6. Unregister the session when the connection ends
///
/// The session unregisters on every exit path, including a failed
/// handshake, so no registry state outlives the connection. The admission
/// ticket is held for the whole connection; dropping it on return is what
/// lets the drain complete.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
    shutdown_state: Option<ShutdownState>,
) -> Result<(), ServerError> {
    let _ticket = match shutdown_state.as_ref() {
        Some(state) => match state.admit_session() {
            Some(ticket) => Some(ticket),
            None => {
                warn!("Refusing connection from {}: server is draining", addr);
                return Ok(());
            }
        },
        None => None,
    };

    if registry.session_count().await >= config.max_connections {
        warn!(
            "Connection limit ({}) reached, refusing {}",
            config.max_connections, addr
        );
        return Ok(());
    }

    let session = Session::new(addr);
    let handler = registry.register(&session).await;
    session.install_handler(handler).await;
    info!("🔗 Session {} connected from {}", session.id(), addr);

    let outcome = session.clone().run(stream).await;

    registry.unregister(session.id()).await;
    match outcome {
        Ok(()) => info!("❌ Session {} from {} disconnected", session.id(), addr),
        Err(e) => warn!("Session {} from {} never came up: {}", session.id(), addr, e),
    }
    Ok(())
}
