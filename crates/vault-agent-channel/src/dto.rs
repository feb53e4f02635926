//! Wire messages exchanged over the `/v1/ws/agent` WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Certificates,
    Secrets,
    Updates,
    DynamicSecrets,
}

/// Messages the server sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Registered { agent_id: String },
    Subscribed { subscriptions: Value },
    Pong,
    Event { topic: Topic, data: Value },
    Error { message: String },
}

/// Messages the agent sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Subscribe {
        topics: Vec<Topic>,
        cert_ids: Vec<String>,
        secret_ids: Vec<String>,
        channel: String,
    },
}
