use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::profile::AgentProfile;
use crate::reconcile::ReconcileConfig;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    port = 7777
//
//   env var:         RELAY_SERVER__PORT=7777   (double underscore = nesting)
//
//   (single underscore stays within field names: RELAY_SERVER__CHANNEL_CAPACITY)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub source: SourceFileConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Named agent profiles (lives under `[profiles.<name>]`). The built-in
    /// default profile is always available even when this table is empty.
    #[serde(default)]
    pub profiles: HashMap<String, AgentProfile>,
}

/// Server tuning knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Frames buffered ahead of a slow client before the upstream iteration
    /// is paused.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Agent backend subprocess (lives under `[source]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceFileConfig {
    #[serde(default = "default_source_command")]
    pub command: String,
    /// Extra arguments placed before the generated ones.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SourceFileConfig {
    fn default() -> Self {
        Self {
            command: default_source_command(),
            args: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7777
}

fn default_channel_capacity() -> usize {
    32
}

fn default_source_command() -> String {
    "claude".to_string()
}

/// Layers: struct defaults -> config.toml -> RELAY_* env vars.
pub fn load_config(config_path: Option<&Path>) -> Result<FileConfig> {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    } else {
        figment = figment.merge(Toml::file("config.toml"));
    }

    figment
        .merge(Env::prefixed("RELAY_").split("__"))
        .extract()
        .context("invalid relay configuration")
}
