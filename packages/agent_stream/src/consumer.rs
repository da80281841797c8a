//! SSE Stream Consumer
//!
//! Incremental parsing of relay SSE frames from a raw byte stream, plus a
//! reducer that folds parsed events into UI-facing transcript state.
//!
//! The decoder never parses a payload until its terminating `\n\n` boundary
//! has arrived; an unterminated trailing fragment is retained across feeds,
//! so frames split arbitrarily across network reads reassemble correctly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{DONE_SENTINEL, DownstreamEvent};

/// One complete frame recovered from the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A `data:` payload (not yet parsed as JSON).
    Event(String),
    /// The termination sentinel; no further frames follow.
    Done,
}

/// Incremental SSE frame decoder.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the termination sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds raw bytes and returns every frame completed by this chunk.
    ///
    /// Bytes after the sentinel are discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(boundary) = find_frame_boundary(&self.buffer) {
            let frame_bytes: Vec<u8> = self.buffer.drain(..boundary + 2).collect();
            let text = String::from_utf8_lossy(&frame_bytes[..boundary]);

            let mut data_lines: Vec<&str> = Vec::new();
            for line in text.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
                }
                // Comment lines and unknown fields are ignored per SSE rules.
            }
            if data_lines.is_empty() {
                continue;
            }

            let payload = data_lines.join("\n");
            if payload == DONE_SENTINEL {
                self.done = true;
                self.buffer.clear();
                frames.push(SseFrame::Done);
                break;
            }
            frames.push(SseFrame::Event(payload));
        }
        frames
    }
}

fn find_frame_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// A sub-agent announced on the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubagentActivity {
    pub agent_type: String,
    pub description: String,
}

/// A question the agent is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingQuestion {
    pub tool_use_id: String,
    pub questions: Vec<Value>,
}

/// Folds downstream events into the state a UI renders.
///
/// Malformed frames are counted and ignored rather than treated as fatal;
/// intermediate garbage must not kill a live transcript.
#[derive(Debug, Default)]
pub struct TranscriptReducer {
    pub session_id: Option<String>,
    pub transcript: String,
    pub status: Option<String>,
    pub subagents: Vec<SubagentActivity>,
    pub questions: Vec<PendingQuestion>,
    pub error: Option<String>,
    pub complete: bool,
    pub raw_messages: u64,
    pub parse_failures: u64,
}

impl TranscriptReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one frame payload and applies it. Returns the decoded event,
    /// or `None` when the payload was not a recognizable event.
    pub fn apply_payload(&mut self, payload: &str) -> Option<DownstreamEvent> {
        match serde_json::from_str::<DownstreamEvent>(payload) {
            Ok(event) => {
                self.apply(&event);
                Some(event)
            }
            Err(_) => {
                self.parse_failures += 1;
                None
            }
        }
    }

    /// Applies one decoded event to the transcript state.
    pub fn apply(&mut self, event: &DownstreamEvent) {
        match event {
            DownstreamEvent::Session { session_id } => {
                self.session_id = Some(session_id.clone());
            }
            DownstreamEvent::Text { text } => {
                self.transcript.push_str(text);
                self.status = None;
            }
            DownstreamEvent::SubagentStart {
                agent_type,
                description,
            } => {
                self.subagents.push(SubagentActivity {
                    agent_type: agent_type.clone(),
                    description: description.clone(),
                });
            }
            DownstreamEvent::AskUserQuestion {
                tool_use_id,
                questions,
            } => {
                self.questions.push(PendingQuestion {
                    tool_use_id: tool_use_id.clone(),
                    questions: questions.clone(),
                });
            }
            DownstreamEvent::Status { status } => {
                self.status = Some(status.clone());
            }
            DownstreamEvent::Raw { .. } => {
                self.raw_messages += 1;
            }
            DownstreamEvent::Complete { .. } => {
                self.complete = true;
                self.status = None;
            }
            DownstreamEvent::Error { error, .. } => {
                self.error = Some(error.clone());
                self.status = None;
            }
        }
    }
}
