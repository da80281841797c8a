//! Shared helpers for handler tests: an in-memory scripted message source
//! and ready-made app state around it.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use agent_stream::{
    MessageSource, MessageStream, QueryOptions, Result as SourceResult, SourceError, TurnMessage,
};

use crate::AppState;
use crate::config::FileConfig;
use crate::metrics::RelayMetrics;
use crate::profile::AgentProfile;

/// A message source that replays a fixed script of raw JSON turns,
/// optionally ending in an upstream failure.
pub struct ScriptedSource {
    turns: Vec<Value>,
    trailing_error: Option<String>,
}

impl ScriptedSource {
    pub fn new(turns: Vec<Value>) -> Self {
        Self {
            turns,
            trailing_error: None,
        }
    }

    pub fn failing_after(turns: Vec<Value>, error: impl Into<String>) -> Self {
        Self {
            turns,
            trailing_error: Some(error.into()),
        }
    }
}

impl MessageSource for ScriptedSource {
    fn query(&self, _prompt: &str, _options: &QueryOptions) -> SourceResult<MessageStream> {
        let mut items: Vec<SourceResult<TurnMessage>> = self
            .turns
            .iter()
            .cloned()
            .map(|raw| Ok(TurnMessage::from_json(raw)))
            .collect();
        if let Some(message) = &self.trailing_error {
            items.push(Err(SourceError::Backend(message.clone())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

pub fn state_with_source(source: Arc<dyn MessageSource>) -> AppState {
    AppState {
        config: Arc::new(FileConfig::default()),
        profiles: Arc::new(HashMap::new()),
        default_profile: Arc::new(AgentProfile::default()),
        source,
        metrics: Arc::new(RelayMetrics::new()),
        shutdown: CancellationToken::new(),
    }
}

pub fn scripted_state(turns: Vec<Value>) -> AppState {
    state_with_source(Arc::new(ScriptedSource::new(turns)))
}

pub fn failing_state(turns: Vec<Value>, error: &str) -> AppState {
    state_with_source(Arc::new(ScriptedSource::failing_after(turns, error)))
}

pub fn test_router(state: AppState) -> axum::Router {
    crate::build_router(state)
}
