//! Wire message definitions for client-server communication.
//!
//! Every frame on the wire is a JSON object with a `type` field; the types
//! in this module are the serde models for the recognized shapes.

mod types;

pub use types::{ClientRequest, JoinOutcome, ServerReply};
