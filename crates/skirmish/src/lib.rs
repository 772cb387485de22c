//! # Skirmish Game Server - Main Entry Point
//!
//! Multiplayer WebSocket game server with team-based rooms. This entry
//! point handles CLI parsing, configuration loading, and application
//! lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! skirmish
//!
//! # Specify custom configuration
//! skirmish --config production.toml
//!
//! # Override specific settings
//! skirmish --bind 0.0.0.0:8080 --log-level debug
//!
//! # JSON logging for production
//! skirmish --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created. The
//! `[listener]` section is required; a config file without it is fatal.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the Skirmish Game Server.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and validation
/// 3. Logging system initialization
/// 4. Application creation and execution
/// 5. Error handling and cleanup
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments first
    let args = CliArgs::parse();

    // Load configuration to get logging settings; a file without the
    // required [listener] section is fatal here.
    let config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    // Create and run application
    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{AppConfig as Config, ListenerSettings, LoggingSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let server_config = config
            .to_server_config()
            .expect("Default config should convert to ServerConfig");
        assert_eq!(server_config.max_connections, 1000);
        assert_eq!(server_config.connection_timeout, 60);
    }

    #[tokio::test]
    async fn test_config_validation() {
        let mut config = AppConfig::default();

        // Invalid bind address
        config.listener.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());

        // Invalid log level
        config.listener.bind_address = "127.0.0.1:8080".to_string();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        // Zero connection limit
        config.logging.level = "info".to_string();
        config.listener.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_missing_listener_section_is_fatal() {
        let parsed = toml::from_str::<AppConfig>("[logging]\nlevel = \"info\"\njson_format = false\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let args = CliArgs {
            config_path: PathBuf::from("test.toml"),
            bind_address: Some("127.0.0.1:9000".to_string()),
            log_level: Some("debug".to_string()),
            json_logs: true,
        };

        assert_eq!(args.config_path, PathBuf::from("test.toml"));
        assert_eq!(args.bind_address, Some("127.0.0.1:9000".to_string()));
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert!(args.json_logs);
    }

    #[tokio::test]
    async fn test_config_file_round_trip() {
        let path = PathBuf::from("test_config_round_trip.toml");
        let config = AppConfig::default();
        let toml_content = toml::to_string_pretty(&config)
            .expect("Failed to serialize default config to TOML");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("Failed to write test config file");

        let loaded = AppConfig::load_from_file(&path)
            .await
            .expect("Failed to load test config file");
        assert_eq!(loaded.listener.bind_address, config.listener.bind_address);

        tokio::fs::remove_file(&path).await.ok();
    }
}
