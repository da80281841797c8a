//! Agent Profiles
//!
//! A profile is everything request handling needs to know about one named
//! agent: the system prompt and tool allow-list handed to the backend, which
//! reconciliation strategy its output needs, and how its tool invocations
//! are surfaced as status labels. Profiles turn what would otherwise be one
//! handler per agent into data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use agent_stream::{QueryOptions, SubagentDefinition};

use crate::reconcile::{OverlapDedup, Passthrough, ReconcileConfig, Reconciler};

/// Which reconciliation strategy a profile's output gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Source is known not to restate prior output.
    Passthrough,
    /// Literal overlap detection against cumulative sent text.
    Overlap,
}

/// One named agent configuration, usually loaded from `[profiles.<name>]`
/// in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,

    #[serde(default = "default_dedup_mode")]
    pub dedup: DedupMode,

    /// Skip whole assistant messages whose id was already delivered once.
    #[serde(default = "default_guard_message_ids")]
    pub guard_message_ids: bool,

    /// Emit `Status("Thinking...")` when the backend reports a result
    /// message (it then still falls through to the raw diagnostic rule).
    #[serde(default)]
    pub result_status: bool,

    /// Static tool-name -> status-label table. May be empty; tools without
    /// an entry produce no status event.
    #[serde(default = "default_tool_status_labels")]
    pub tool_status_labels: HashMap<String, String>,

    /// Named sub-agent definitions handed to the backend.
    #[serde(default)]
    pub subagents: HashMap<String, SubagentDefinition>,
}

fn default_allowed_tools() -> Vec<String> {
    vec!["Task".to_string(), "WebSearch".to_string()]
}

fn default_dedup_mode() -> DedupMode {
    DedupMode::Overlap
}

fn default_guard_message_ids() -> bool {
    true
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            system_prompt: None,
            allowed_tools: default_allowed_tools(),
            permission_mode: None,
            dedup: default_dedup_mode(),
            guard_message_ids: default_guard_message_ids(),
            result_status: false,
            tool_status_labels: default_tool_status_labels(),
            subagents: HashMap::new(),
        }
    }
}

/// Labels for the common built-in tools.
pub fn default_tool_status_labels() -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert("WebSearch".to_string(), "Searching the web...".to_string());
    labels.insert("WebFetch".to_string(), "Reading a page...".to_string());
    labels.insert("Read".to_string(), "Reading files...".to_string());
    labels.insert("Grep".to_string(), "Searching files...".to_string());
    labels
}

impl AgentProfile {
    /// Builds the upstream query options for one request.
    pub fn query_options(&self, resume: Option<String>) -> QueryOptions {
        QueryOptions {
            allowed_tools: self.allowed_tools.clone(),
            permission_mode: self.permission_mode.clone(),
            resume,
            system_prompt: self.system_prompt.clone(),
            agents: self.subagents.clone(),
        }
    }

    /// Fresh request-scoped reconciler for this profile.
    pub fn make_reconciler(&self, config: &ReconcileConfig) -> Box<dyn Reconciler> {
        match self.dedup {
            DedupMode::Passthrough => Box::new(Passthrough),
            DedupMode::Overlap => Box::new(OverlapDedup::new(config.clone())),
        }
    }
}
