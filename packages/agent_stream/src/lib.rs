//! # Agent Stream
//!
//! A Rust library for consuming conversational-agent backend streams and the
//! transcript relay's downstream SSE wire protocol.
//!
//! ## Overview
//!
//! An agent backend yields an unbounded, ordered sequence of JSON turn
//! messages for one request. This library provides:
//! - Type-safe structures for the upstream turn-message format
//! - A pluggable [`MessageSource`] abstraction with a subprocess-backed
//!   implementation ([`CliSource`])
//! - The downstream event vocabulary the relay emits to UI clients
//! - An incremental SSE frame decoder and transcript reducer for clients
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agent_stream::{CliSource, MessageSource, QueryOptions};
//! use futures::StreamExt;
//!
//! # async fn run() -> agent_stream::Result<()> {
//! let source = CliSource::new("claude");
//! let mut stream = source.query("Summarize the README", &QueryOptions::default())?;
//!
//! while let Some(message) = stream.next().await {
//!     let message = message?;
//!     println!("{}", message.raw);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Consuming a relay stream
//!
//! ```rust
//! use agent_stream::{SseFrame, SseFrameDecoder, TranscriptReducer};
//!
//! let mut decoder = SseFrameDecoder::new();
//! let mut reducer = TranscriptReducer::new();
//!
//! for frame in decoder.feed(b"data: {\"type\":\"text\",\"text\":\"Hello\"}\n\n") {
//!     if let SseFrame::Event(payload) = frame {
//!         reducer.apply_payload(&payload);
//!     }
//! }
//! assert_eq!(reducer.transcript, "Hello");
//! ```

pub mod consumer;
pub mod error;
pub mod protocol;
pub mod source;
pub mod types;

pub use consumer::{PendingQuestion, SseFrame, SseFrameDecoder, SubagentActivity, TranscriptReducer};
pub use error::{Result, SourceError};
pub use protocol::{DONE_SENTINEL, DownstreamEvent};
pub use source::{CliSource, MessageSource, MessageStream, QueryOptions, SubagentDefinition};
pub use types::{AgentSession, AssistantMessage, ContentBlock, TurnKind, TurnMessage};
