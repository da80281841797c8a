//! Downstream Wire Protocol
//!
//! The small, stable event vocabulary the relay emits to UI clients. One
//! event per SSE frame: `data: <json>\n\n`, stream terminated by
//! `data: [DONE]\n\n`. Shared by the relay server (producer) and the SSE
//! consumer (client side).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel payload marking the end of a relay stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One normalized event in the downstream transcript stream.
///
/// The tag and field casing are the wire contract with the UI; changing
/// either breaks deployed clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownstreamEvent {
    /// Announces the upstream session handling this request. Emitted at most
    /// once per request; clients keep the id to resume the conversation.
    #[serde(rename_all = "camelCase")]
    Session { session_id: String },

    /// Genuinely new transcript text (already reconciled against everything
    /// previously sent on this request).
    Text { text: String },

    /// The agent delegated a focused sub-task to a sub-agent.
    #[serde(rename_all = "camelCase")]
    SubagentStart {
        agent_type: String,
        description: String,
    },

    /// The agent is asking the user to answer structured questions.
    #[serde(rename_all = "camelCase")]
    AskUserQuestion {
        tool_use_id: String,
        questions: Vec<Value>,
    },

    /// Human-readable progress label for a tool invocation.
    Status { status: String },

    /// Diagnostic passthrough of an upstream message the translator has no
    /// mapping for.
    Raw { message: Value },

    /// Stream exhaustion: the full audit trail of every upstream message
    /// seen on this request, in order.
    #[serde(rename_all = "camelCase")]
    Complete { all_messages: Vec<Value> },

    /// Upstream failure. `error` is the generic user-facing message,
    /// `detail` the verbose diagnostic.
    Error { error: String, detail: String },
}
