//! Chat Handlers
//!
//! One inbound request maps to exactly one upstream iteration and one
//! [`Translator`]. The per-request loop is strictly sequential: await the
//! next turn message, translate, push the resulting frames through the
//! bounded transport channel, then await again. Because the channel is
//! bounded, a slow client pauses the upstream iteration instead of growing
//! memory; a disconnected client cancels it.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use agent_stream::{DownstreamEvent, SourceError};

use crate::AppState;
use crate::profile::AgentProfile;
use crate::sse::{FrameSink, SinkError, sse_response};
use crate::translate::Translator;

/// Generic user-facing message for upstream failures; the verbose cause goes
/// in the event's `detail` field.
const UPSTREAM_ERROR_MESSAGE: &str = "Agent stream failed";

/// Inbound request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Resume token of a prior conversation, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /api/chat` - stream a transcript using the default profile.
pub async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    start_stream(state, None, req)
}

/// `POST /api/agents/{profile}/chat` - stream a transcript using a named
/// profile.
pub async fn agent_chat_handler(
    State(state): State<AppState>,
    Path(profile): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Response {
    start_stream(state, Some(profile), req)
}

fn start_stream(state: AppState, profile_name: Option<String>, req: ChatRequest) -> Response {
    // Validation failures never open a stream.
    let message = match req.message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => {
            state.metrics.validation_reject();
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "Missing message" })),
            )
                .into_response();
        }
    };

    let profile = match &profile_name {
        None => state.default_profile.clone(),
        Some(name) => match state.profiles.get(name) {
            Some(profile) => profile.clone(),
            None => {
                state.metrics.validation_reject();
                return (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({
                        "error": format!("Unknown agent profile: {name}")
                    })),
                )
                    .into_response();
            }
        },
    };

    let (sink, response) = sse_response(state.config.server.channel_capacity);
    state.metrics.request_started();

    let request_id = Uuid::new_v4();
    let span = info_span!("relay", request_id = %request_id, profile = profile_name.as_deref().unwrap_or("default"));
    tokio::spawn(run_relay(state, profile, message, req.session_id, sink).instrument(span));

    response
}

#[derive(Debug, thiserror::Error)]
enum RelayError {
    #[error(transparent)]
    Upstream(SourceError),
    #[error("client disconnected")]
    Disconnected,
    #[error(transparent)]
    Transport(SinkError),
}

/// The per-request relay loop, running as its own task for the lifetime of
/// the stream.
async fn run_relay(
    state: AppState,
    profile: Arc<AgentProfile>,
    message: String,
    resume: Option<String>,
    sink: FrameSink,
) {
    let mut translator = Translator::new(profile.clone(), &state.config.reconcile);

    let outcome = tokio::select! {
        outcome = relay_messages(&state, &profile, &message, resume, &mut translator, &sink) => outcome,
        // Client went away: cancel the upstream iteration. Dropping the
        // message stream tears down the backend subprocess.
        () = sink.closed() => Err(RelayError::Disconnected),
        // Server shutdown: end the stream cleanly with what we have.
        () = state.shutdown.cancelled() => Ok(()),
    };

    state
        .metrics
        .blocks_suppressed_add(translator.suppressed_blocks());

    match outcome {
        Ok(()) => {
            let complete = translator.finish();
            if send_frame(&state, &sink, &complete).await.is_ok() && sink.finish().await.is_ok() {
                state.metrics.frame_sent();
            }
            state.metrics.request_completed();
        }
        Err(RelayError::Upstream(e)) => {
            warn!(error = %e, "upstream iteration failed; tearing down stream");
            state.metrics.request_failed();
            let event = DownstreamEvent::Error {
                error: UPSTREAM_ERROR_MESSAGE.to_string(),
                detail: e.to_string(),
            };
            if send_frame(&state, &sink, &event).await.is_ok() && sink.finish().await.is_ok() {
                state.metrics.frame_sent();
            }
        }
        Err(RelayError::Disconnected) => {
            debug!("client disconnected mid-stream; upstream iteration cancelled");
            state.metrics.client_disconnect();
        }
        Err(RelayError::Transport(e)) => {
            // Write failure after the stream started is unrecoverable; no
            // further events are attempted.
            warn!(error = %e, "transport failed mid-stream");
            state.metrics.client_disconnect();
        }
    }
}

async fn relay_messages(
    state: &AppState,
    profile: &AgentProfile,
    message: &str,
    resume: Option<String>,
    translator: &mut Translator,
    sink: &FrameSink,
) -> Result<(), RelayError> {
    let options = profile.query_options(resume);
    let mut stream = state
        .source
        .query(message, &options)
        .map_err(RelayError::Upstream)?;

    while let Some(item) = stream.next().await {
        let turn = item.map_err(RelayError::Upstream)?;
        for event in translator.translate(&turn) {
            if matches!(event, DownstreamEvent::Text { .. }) {
                state.metrics.text_event();
            }
            send_frame(state, sink, &event).await?;
        }
    }
    Ok(())
}

async fn send_frame(
    state: &AppState,
    sink: &FrameSink,
    event: &DownstreamEvent,
) -> Result<(), RelayError> {
    sink.send(event).await.map_err(|e| match e {
        SinkError::Closed => RelayError::Disconnected,
        other => RelayError::Transport(other),
    })?;
    state.metrics.frame_sent();
    Ok(())
}
