use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// Opaque identity for a multi-turn conversation.
///
/// Owned and persisted by the upstream collaborator's session store; the
/// relay only references it (via the resume token) and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
}

/// One unit yielded by the upstream agent iteration, decoded once at the
/// boundary into a closed set of shapes. The raw JSON is retained alongside
/// so diagnostic passthrough and the end-of-stream audit trail can forward
/// messages verbatim.
#[derive(Debug, Clone)]
pub struct TurnMessage {
    pub kind: TurnKind,
    pub raw: Value,
}

/// The closed set of upstream message shapes the relay understands.
///
/// Anything with an unrecognized `type` tag, or a recognized tag whose body
/// fails to decode, lands in `Other` and is forwarded as a raw diagnostic
/// event downstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnKind {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: AssistantMessage,
    },
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    /// Catch-all for unknown message types
    #[serde(other)]
    Other,
}

/// The model turn carried by an `assistant` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A sub-unit of an assistant turn: literal text, or a request to invoke a
/// named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Catch-all for unknown content types
    #[serde(other)]
    Unknown,
}

impl TurnMessage {
    /// Decodes a JSON value into the closed turn-message set.
    ///
    /// Decoding never rejects a message outright: shapes the relay does not
    /// recognize become `TurnKind::Other` with the raw value preserved.
    pub fn from_json(raw: Value) -> Self {
        let kind = serde_json::from_value(raw.clone()).unwrap_or(TurnKind::Other);
        Self { kind, raw }
    }

    /// Decodes one JSONL line from the backend.
    pub fn from_json_line(line: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(line)?;
        Ok(Self::from_json(raw))
    }

    /// The backend-assigned message id, when this is an assistant turn.
    pub fn message_id(&self) -> Option<&str> {
        match &self.kind {
            TurnKind::Assistant { message } => message.id.as_deref(),
            _ => None,
        }
    }

    /// The session id announced by an init message.
    pub fn init_session_id(&self) -> Option<&str> {
        match &self.kind {
            TurnKind::System { subtype, session_id }
                if subtype.as_deref() == Some("init") =>
            {
                session_id.as_deref()
            }
            _ => None,
        }
    }
}
