//! Event Translator
//!
//! Maps each upstream [`TurnMessage`] into zero or more normalized
//! [`DownstreamEvent`]s, in order. All per-request state lives here: the set
//! of assistant message ids already delivered (some backends resend a whole
//! message on a later turn), the reconciler's cumulative sent text, and the
//! audit trail of raw upstream messages. Nothing is shared across requests.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use agent_stream::{ContentBlock, DownstreamEvent, TurnKind, TurnMessage};

use crate::profile::AgentProfile;
use crate::reconcile::{ReconcileConfig, Reconciler};

/// Default sub-agent type when the Task input omits one.
const UNKNOWN_AGENT_TYPE: &str = "unknown";

/// Default sub-agent description when the Task input omits one.
const DEFAULT_TASK_DESCRIPTION: &str = "Working...";

/// Status label attached to backend result messages (when the profile opts
/// in via `result_status`).
const RESULT_STATUS_LABEL: &str = "Thinking...";

/// Per-request translator. Build one per inbound request, feed it every
/// upstream message in order, then call [`Translator::finish`] on stream
/// exhaustion.
pub struct Translator {
    profile: Arc<AgentProfile>,
    reconciler: Box<dyn Reconciler>,
    seen_message_ids: HashSet<String>,
    session_announced: bool,
    all_messages: Vec<Value>,
    suppressed_blocks: u64,
}

impl Translator {
    pub fn new(profile: Arc<AgentProfile>, reconcile_config: &ReconcileConfig) -> Self {
        let reconciler = profile.make_reconciler(reconcile_config);
        Self {
            profile,
            reconciler,
            seen_message_ids: HashSet::new(),
            session_announced: false,
            all_messages: Vec::new(),
            suppressed_blocks: 0,
        }
    }

    /// Text blocks the reconciler suppressed entirely on this request.
    pub fn suppressed_blocks(&self) -> u64 {
        self.suppressed_blocks
    }

    /// Translates one upstream message. Downstream event order preserves
    /// upstream order; nothing is dropped except by the message-id guard
    /// and the reconciler's explicit rules.
    pub fn translate(&mut self, message: &TurnMessage) -> Vec<DownstreamEvent> {
        self.all_messages.push(message.raw.clone());

        match &message.kind {
            TurnKind::System { .. } => {
                if let Some(session_id) = message.init_session_id() {
                    if !self.session_announced {
                        self.session_announced = true;
                        return vec![DownstreamEvent::Session {
                            session_id: session_id.to_string(),
                        }];
                    }
                }
                // Non-init (or repeated init) system messages have no
                // mapping; pass through as diagnostics.
                vec![DownstreamEvent::Raw {
                    message: message.raw.clone(),
                }]
            }

            TurnKind::Assistant { message: assistant } => {
                if self.profile.guard_message_ids {
                    if let Some(id) = &assistant.id {
                        if !self.seen_message_ids.insert(id.clone()) {
                            debug!(message_id = %id, "skipping resent assistant message");
                            return Vec::new();
                        }
                    }
                }

                let mut events = Vec::new();
                for block in &assistant.content {
                    self.translate_block(block, &mut events);
                }
                events
            }

            TurnKind::Result { .. } => {
                let mut events = Vec::new();
                if self.profile.result_status {
                    events.push(DownstreamEvent::Status {
                        status: RESULT_STATUS_LABEL.to_string(),
                    });
                }
                events.push(DownstreamEvent::Raw {
                    message: message.raw.clone(),
                });
                events
            }

            TurnKind::Other => vec![DownstreamEvent::Raw {
                message: message.raw.clone(),
            }],
        }
    }

    fn translate_block(&mut self, block: &ContentBlock, events: &mut Vec<DownstreamEvent>) {
        match block {
            ContentBlock::Text { text } => {
                let reconciled = self.reconciler.reconcile(text);
                if reconciled.is_empty() {
                    if !text.is_empty() {
                        self.suppressed_blocks += 1;
                    }
                } else {
                    events.push(DownstreamEvent::Text { text: reconciled });
                }
            }

            ContentBlock::ToolUse { id, name, input } => match name.as_str() {
                "Task" => events.push(DownstreamEvent::SubagentStart {
                    agent_type: string_field(input, "subagent_type")
                        .unwrap_or_else(|| UNKNOWN_AGENT_TYPE.to_string()),
                    description: string_field(input, "description")
                        .unwrap_or_else(|| DEFAULT_TASK_DESCRIPTION.to_string()),
                }),
                "AskUserQuestion" => events.push(DownstreamEvent::AskUserQuestion {
                    tool_use_id: id.clone(),
                    questions: input
                        .get("questions")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                }),
                other => {
                    if let Some(label) = self.profile.tool_status_labels.get(other) {
                        events.push(DownstreamEvent::Status {
                            status: label.clone(),
                        });
                    }
                }
            },

            // Unknown block shapes carry nothing the UI can render.
            ContentBlock::Unknown => {}
        }
    }

    /// Stream exhaustion: the audit trail of every upstream message seen.
    pub fn finish(&mut self) -> DownstreamEvent {
        DownstreamEvent::Complete {
            all_messages: std::mem::take(&mut self.all_messages),
        }
    }
}

fn string_field(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}
