//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! server startup, monitoring, and shutdown with structured error handling.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use skirmish_server::{GameServer, ShutdownState};
use tracing::{error, info, warn};

/// Main application struct with monitoring capabilities.
///
/// The `Application` struct manages the complete lifecycle of the Skirmish
/// server, including configuration loading, server initialization, periodic
/// statistics reporting, and graceful shutdown handling.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Game server instance
    server: GameServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, and
    /// initializes the game server.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Initialize game server with configuration
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.listener.bind_address = bind_address;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let server = GameServer::new(server_config);

        info!("🚀 Skirmish Game Server v{}", env!("CARGO_PKG_VERSION"));
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// Starts the server, sets up the monitoring task, waits for shutdown
    /// signals, and performs the phased graceful shutdown.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Skirmish Game Server Application");

        self.log_configuration_summary();

        // Keep a registry handle for monitoring and teardown before the
        // server moves into its task.
        let registry = self.server.registry();

        let shutdown_state = ShutdownState::new();
        let shutdown_state_for_server = shutdown_state.clone();

        let server_handle = {
            let server = self.server;
            tokio::spawn(async move {
                match server.start_with_shutdown_state(shutdown_state_for_server).await {
                    Ok(()) => {
                        info!("✅ Server completed successfully");
                    }
                    Err(e) => {
                        error!("❌ Server error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        // Periodic statistics reporting
        let monitoring_handle = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    info!(
                        "📊 System Health - {} session(s) | {} game(s) active",
                        registry.session_count().await,
                        registry.game_count().await
                    );
                }
            })
        };

        info!("✅ Skirmish Server is now running!");
        info!(
            "🎮 Ready to accept connections on {}",
            self.config.listener.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        // Wait for shutdown signal
        let signal_shutdown_state = setup_signal_handlers().await?;

        // A second signal forces immediate exit.
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up forced shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        if signal_shutdown_state.is_draining() {
            shutdown_state.begin_drain();
        }

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        // Phase 1: stop accepting new connections and joins
        info!("📡 Phase 1: Stopping new connections...");
        monitoring_handle.abort();
        registry.shutdown();

        // Phase 2: wait for admitted sessions to finish
        info!("⏳ Phase 2: Draining in-flight sessions...");
        let mut wait_cycles = 0;
        const MAX_WAIT_CYCLES: u32 = 30; // Wait up to 3 seconds (30 * 100ms)

        while wait_cycles < MAX_WAIT_CYCLES {
            if shutdown_state.is_drained() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            wait_cycles += 1;
        }

        if wait_cycles >= MAX_WAIT_CYCLES {
            info!(
                "⏰ Timeout reached, proceeding with shutdown ({} session(s) still in flight)",
                shutdown_state.in_flight_sessions()
            );
        } else {
            info!("✅ All in-flight sessions drained");
        }

        // Phase 3: stop the accept loop
        info!("🧹 Phase 3: Final cleanup - stopping server accept loop...");
        server_handle.abort();
        if let Err(e) = tokio::time::timeout(
            tokio::time::Duration::from_secs(8),
            server_handle,
        )
        .await
        {
            warn!("⏰ Server task did not complete within timeout: {:?}", e);
        } else {
            info!("✅ Server task completed");
        }

        log_final_statistics(&registry).await;

        info!("✅ Skirmish Game Server shutdown complete");
        info!("👋 Thank you for using Skirmish!");

        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.listener.bind_address);
        info!(
            "  👥 Max connections: {}",
            self.config.listener.max_connections
        );
        info!(
            "  ⏱️ Connection timeout: {}s",
            self.config.listener.connection_timeout
        );
    }
}

/// Logs final statistics during shutdown.
async fn log_final_statistics(registry: &std::sync::Arc<skirmish_server::SessionRegistry>) {
    info!("📊 Final Statistics:");
    info!("  - Sessions still registered: {}", registry.session_count().await);
    info!("  - Games still active: {}", registry.game_count().await);
}
