//! Logging system setup and configuration.
//!
//! This module handles the initialization and configuration of the
//! tracing-based logging system with support for both human-readable and
//! JSON output formats.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// Sets up tracing-subscriber with appropriate formatting, filtering, and
/// output based on the provided logging settings and CLI overrides.
///
/// # Features
///
/// * **Environment variable support** - Respects `RUST_LOG` if set
/// * **Flexible formatting** - Human-readable or JSON output
/// * **Thread information** - Includes thread IDs and names for debugging
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Displays the startup banner using proper logging.
///
/// Shows the Skirmish server logo and version information using structured
/// logging instead of direct console output.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║           ⚔️  SKIRMISH SERVER ⚔️          ║");
    info!("║                 v{}                   ║", version);
    info!("║                                          ║");
    info!("║  Real-Time Multiplayer Game Server       ║");
    info!("║                                          ║");
    info!("║  🎯 Team-Based Game Rooms                ║");
    info!("║  📡 WebSocket Broadcast Fan-Out          ║");
    info!("║  ⚡ Ordered Per-Session Pipelines        ║");
    info!("╚══════════════════════════════════════════╝");
}
