//! Signal handling for graceful server shutdown.
//!
//! This module provides cross-platform signal handling to allow the server
//! to shut down gracefully when receiving termination signals.

use skirmish_server::ShutdownState;
use tokio::signal;
use tracing::info;

/// Sets up graceful shutdown signal handling for the application.
///
/// Listens for termination signals (SIGINT, SIGTERM on Unix; Ctrl+C on
/// Windows) and returns when one is received, along with a shutdown state
/// for coordinating graceful shutdown across components.
pub async fn setup_signal_handlers() -> Result<ShutdownState, Box<dyn std::error::Error>> {
    let shutdown_state = setup_signal_handlers_silent().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(shutdown_state)
}

/// Waits for a termination signal without logging, and returns a shutdown
/// state that is already draining.
pub async fn setup_signal_handlers_silent() -> Result<ShutdownState, Box<dyn std::error::Error>> {
    let shutdown_state = ShutdownState::new();

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    shutdown_state.begin_drain();
    Ok(shutdown_state)
}
