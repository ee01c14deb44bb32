//! Control-plane message types
//!
//! Steady-state traffic is UTF-8 JSON. Commands carry a `command` tag;
//! replies carry `response` and `author`. Unknown command tags still parse
//! so the worker can answer them instead of dropping them.

use serde::{Deserialize, Serialize};

/// Command broadcast to every other worker
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Report current gateway latency
    Ping,
    /// Evaluate a diagnostic expression
    Eval {
        #[serde(default)]
        content: String,
    },
    /// Any command tag this version does not know
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    pub fn eval(content: impl Into<String>) -> Self {
        ControlMessage::Eval {
            content: content.into(),
        }
    }

    /// Command name as it appears on the wire
    pub fn command_name(&self) -> &'static str {
        match self {
            ControlMessage::Ping => "ping",
            ControlMessage::Eval { .. } => "eval",
            ControlMessage::Unknown => "unknown",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reply from one worker to a command
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    /// Command output or error text
    pub response: String,
    /// Name of the replying worker
    pub author: String,
}

impl ControlReply {
    pub fn new(response: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            author: author.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Anything a worker may receive from the hub
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum HubMessage {
    Command(ControlMessage),
    Reply(ControlReply),
}

impl HubMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
