//! Configuration management for the Skirmish game server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments. The `[listener]`
//! section is mandatory; a configuration file without it fails to load and
//! the process exits.

use serde::{Deserialize, Serialize};
use skirmish_server::ServerConfig;
use std::path::PathBuf;
use tracing::info;

/// Default for max_connections
fn default_max_connections() -> usize {
    1000
}

/// Default for connection_timeout
fn default_connection_timeout() -> u64 {
    60
}

/// Application configuration loaded from a TOML file.
///
/// The `listener` section is required; `logging` falls back to defaults
/// when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener configuration settings (required)
    pub listener: ListenerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Listener-specific configuration settings.
///
/// Controls network binding, connection limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listener: ListenerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                connection_timeout: default_connection_timeout(),
            },
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration. A file
    /// that exists but lacks the `[listener]` section is an error.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a game server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.listener.bind_address.parse()?,
            max_connections: self.listener.max_connections,
            connection_timeout: self.listener.connection_timeout,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks the bind address and logging settings for validity.
    pub fn validate(&self) -> Result<(), String> {
        if self
            .listener
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "Invalid bind address: {}",
                &self.listener.bind_address
            ));
        }

        if self.listener.max_connections == 0 {
            return Err("max_connections must be greater than zero".to_string());
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(format!("Invalid log level: {other}")),
        }

        Ok(())
    }
}
