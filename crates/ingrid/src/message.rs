//! Editor-facing message envelopes.
//!
//! Both directions use `{"msg": <tag>, "payload": <value>}`.

use crate::error::{HistoryError, Result};
use crate::types::Cursor;
use serde::{Deserialize, Serialize};

/// Untyped envelope as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub msg: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Events sent by the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Full application snapshot to cache and back up.
    Cache(serde_json::Value),
    Undo,
    Redo,
    /// Cursor to record in the history chain.
    PersistHistory(Cursor),
}

impl Inbound {
    /// Checks the tag and payload shape. Unknown tags are
    /// [`HistoryError::InvalidMessage`].
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        match envelope.msg.as_str() {
            "cache" => Ok(Inbound::Cache(envelope.payload)),
            "undo" => Ok(Inbound::Undo),
            "redo" => Ok(Inbound::Redo),
            "persistHistory" => Ok(Inbound::PersistHistory(Cursor(envelope.payload))),
            _ => Err(HistoryError::InvalidMessage(envelope.msg)),
        }
    }

    /// Parses one JSON-encoded envelope.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| HistoryError::InvalidMessage(format!("malformed envelope: {e}")))?;
        Self::from_envelope(envelope)
    }

    /// Wire tag of the message.
    pub fn name(&self) -> &'static str {
        match self {
            Inbound::Cache(_) => "cache",
            Inbound::Undo => "undo",
            Inbound::Redo => "redo",
            Inbound::PersistHistory(_) => "persistHistory",
        }
    }
}

/// Events sent to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", content = "payload", rename_all = "camelCase")]
pub enum Outbound {
    /// Cursor the editor should restore.
    History(Cursor),
    /// `[title, description]` of a non-fatal condition.
    Warning(String, String),
    /// `[title, description]` of a failed operation.
    Error(String, String),
}

impl Outbound {
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Outbound::Error(title.into(), description.into())
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Outbound::Warning(title.into(), description.into())
    }

    /// Serializes the message as a `{"msg", "payload"}` envelope.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
