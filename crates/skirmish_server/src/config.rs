//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the game server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration structure for the game server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Connection timeout in seconds
    pub connection_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("Invalid default bind address"),
            max_connections: 1000,
            connection_timeout: 60,
        }
    }
}
