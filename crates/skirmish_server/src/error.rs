//! Error types and handling for the game server.
//!
//! Failures are grouped by where they arise in a connection's life: the
//! server-side WebSocket handshake, socket-level networking, encoding of
//! reply frames, and session lifecycle violations.

/// Enumeration of possible server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The server-side WebSocket handshake with a client failed; the
    /// session never came up
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Socket-level failures such as bind or accept errors
    #[error("Network error: {0}")]
    Network(String),

    /// A reply could not be encoded into a wire frame
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Session lifecycle violations, such as driving the same session twice
    #[error("Session error: {0}")]
    Session(String),
}
