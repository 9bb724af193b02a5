//! Push channel wire messages
//!
//! Every frame on the push channel is a UTF-8 JSON object of the form
//! `{ "type": string, "data": object | null, ... }`. Only `monitor_update`
//! is interpreted by this crate; other types pass through untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::MonitorPatch;

/// Message type carrying a partial monitor record
pub const MONITOR_UPDATE: &str = "monitor_update";

/// A single push channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<Value>,
    /// Any additional top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WireMessage {
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
            extra: Map::new(),
        }
    }

    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Inbound message classified by type
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    MonitorUpdate(MonitorPatch),
    Other(WireMessage),
}

impl From<WireMessage> for InboundMessage {
    fn from(message: WireMessage) -> Self {
        if message.kind == MONITOR_UPDATE {
            if let Some(Value::Object(fields)) = &message.data {
                return InboundMessage::MonitorUpdate(MonitorPatch::new(fields.clone()));
            }
        }
        InboundMessage::Other(message)
    }
}

/// Receives every well-formed message in the order it arrived on the socket
///
/// The reader task awaits `handle` before reading the next frame.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: WireMessage);
}

/// Handler that discards everything
#[derive(Debug, Default, Clone)]
pub struct IgnoreMessages;

#[async_trait]
impl MessageHandler for IgnoreMessages {
    async fn handle(&self, _message: WireMessage) {}
}
