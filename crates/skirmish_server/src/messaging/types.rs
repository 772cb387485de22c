//! Message type definitions for client-server communication.
//!
//! This module defines the structure of messages exchanged between
//! clients and the server. Requests and replies are tagged JSON objects;
//! the `type` field selects the variant.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// A request sent from a client that has not yet joined a game.
///
/// Frames that do not parse into one of these variants (unknown `type`,
/// missing fields, malformed JSON) are answered with a [`ServerReply::Warning`]
/// and cause no state change.
///
/// # Examples
///
/// ```json
/// {"type":"join","game":"alpha","nick":"ripley"}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Request to join the named game room
    Join {
        /// Name of the room to join; created on demand
        game: String,
        /// Nickname for the new player
        nick: String,
    },
}

/// Outcome discriminant carried inside a join reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOutcome {
    /// The session was added to the game
    Joined,
    /// The chosen team (or the smaller team, for random picks) was at capacity
    Full,
}

/// A reply sent from the server to a single client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerReply {
    /// Answer to a join request.
    ///
    /// On success carries the assigned player id and a snapshot of all
    /// players currently in the game; on failure only the outcome.
    JoinResult {
        result: JoinOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        my_id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        players: Option<Vec<serde_json::Value>>,
    },

    /// Diagnostic frame for requests the server did not recognize.
    Warning { message: String, closed: bool },
}

impl ServerReply {
    /// Builds the successful join reply.
    pub fn joined(my_id: u64, players: Vec<serde_json::Value>) -> Self {
        Self::JoinResult {
            result: JoinOutcome::Joined,
            my_id: Some(my_id),
            players: Some(players),
        }
    }

    /// Builds the join reply for a full game.
    pub fn join_full() -> Self {
        Self::JoinResult {
            result: JoinOutcome::Full,
            my_id: None,
            players: None,
        }
    }

    /// Builds the warning sent in response to an unrecognized frame.
    pub fn unidentified_warning() -> Self {
        Self::Warning {
            message: "Received an unidentified package.".to_string(),
            closed: false,
        }
    }

    /// Serializes this reply into a text frame payload.
    pub fn encode(&self) -> Result<Utf8Bytes, ServerError> {
        Ok(serde_json::to_string(self)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_parses() {
        let request: ClientRequest =
            serde_json::from_str(r#"{"type":"join","game":"alpha","nick":"a"}"#).unwrap();
        let ClientRequest::Join { game, nick } = request;
        assert_eq!(game, "alpha");
        assert_eq!(nick, "a");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientRequest>(r#"{"type":"ping"}"#).is_err());
        assert!(serde_json::from_str::<ClientRequest>(r#"{"game":"alpha"}"#).is_err());
        assert!(serde_json::from_str::<ClientRequest>("not json").is_err());
    }

    #[test]
    fn joined_reply_shape() {
        let reply = ServerReply::joined(3, vec![serde_json::json!({"id": 3})]);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "join-result");
        assert_eq!(json["result"], "joined");
        assert_eq!(json["my_id"], 3);
        assert_eq!(json["players"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn full_reply_omits_optional_fields() {
        let json = serde_json::to_value(ServerReply::join_full()).unwrap();
        assert_eq!(json["type"], "join-result");
        assert_eq!(json["result"], "full");
        assert!(json.get("my_id").is_none());
        assert!(json.get("players").is_none());
    }

    #[test]
    fn encoded_reply_round_trips_as_json() {
        let frame = ServerReply::joined(1, vec![]).encode().unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(json["type"], "join-result");
        assert_eq!(json["result"], "joined");
    }

    #[test]
    fn warning_reply_shape() {
        let json = serde_json::to_value(ServerReply::unidentified_warning()).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["message"], "Received an unidentified package.");
        assert_eq!(json["closed"], false);
    }
}
