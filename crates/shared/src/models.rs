//! Wire-level messages exchanged with the relay.
//!
//! Every message is a UTF-8 JSON text frame. Inbound kinds are decoded once
//! at the connection boundary into the tagged unions below; anything
//! well-formed that is not a recognized kind lands in the `Unrecognized`
//! variant and is ignored by the server.

use serde::{Deserialize, Serialize};

/// Stream availability as reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    ActiveStream,
    NoStream,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveStream => "active_stream",
            Self::NoStream => "no_stream",
        }
    }
}

/// Message received on a producer (`/upload`) connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerMessage {
    /// Replaces the relay's current frame. A missing or null `data` field
    /// makes the message a no-op.
    Frame {
        #[serde(default)]
        data: Option<String>,
    },
    /// Well-formed JSON that is not a recognized producer message.
    #[serde(untagged)]
    Unrecognized(serde_json::Value),
}

/// Message received on a consumer (`/download`) connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConsumerMessage {
    /// Pull request for the latest frame.
    GetFrame,
    /// Well-formed JSON that is not a recognized consumer message.
    #[serde(untagged)]
    Unrecognized(serde_json::Value),
}

/// Status notice pushed to consumers, on connect and on 0↔1 producer
/// transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub status: StreamStatus,
}

/// Frame payload sent to a consumer in response to a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReply {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub data: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl FrameReply {
    pub fn new(data: String, timestamp: i64) -> Self {
        Self {
            msg_type: "frame".to_string(),
            data,
            timestamp,
        }
    }
}
