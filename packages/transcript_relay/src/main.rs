use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;
mod profile;
mod reconcile;
mod sse;
#[cfg(test)]
mod test_helpers;
mod translate;

use agent_stream::{CliSource, MessageSource};

use crate::config::FileConfig;
use crate::metrics::RelayMetrics;
use crate::profile::AgentProfile;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "trelay")]
#[command(about = "Relay server streaming agent transcripts to remote UIs")]
struct Cli {
    /// Port for the relay server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Agent backend command (overrides config)
    #[arg(long)]
    source_command: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Shared state handed to every handler. Everything here is process-wide
/// and immutable (or internally atomic); per-request reconciliation state
/// never lives in it.
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<FileConfig>,
    /// Named profiles from config.
    pub profiles: Arc<HashMap<String, Arc<AgentProfile>>>,
    /// Profile used by `/api/chat` (the `default` config entry, if present).
    pub default_profile: Arc<AgentProfile>,
    pub source: Arc<dyn MessageSource>,
    pub metrics: Arc<RelayMetrics>,
    /// Cancelled on shutdown; in-flight relay loops end their streams
    /// cleanly.
    pub shutdown: CancellationToken,
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat_handler))
        .route(
            "/api/agents/{profile}/chat",
            post(handlers::agent_chat_handler),
        )
        .route("/api/health", get(handlers::health_handler))
        .route("/api/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "transcript_relay=debug,tower_http=debug,info"
    } else {
        "transcript_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(command) = cli.source_command {
        config.source.command = command;
    }

    info!("Starting transcript relay");

    let source =
        CliSource::new(config.source.command.clone()).with_args(config.source.args.clone());

    let profiles: HashMap<String, Arc<AgentProfile>> = config
        .profiles
        .iter()
        .map(|(name, profile)| (name.clone(), Arc::new(profile.clone())))
        .collect();
    let default_profile = profiles
        .get("default")
        .cloned()
        .unwrap_or_else(|| Arc::new(AgentProfile::default()));

    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        profiles: Arc::new(profiles),
        default_profile,
        source: Arc::new(source),
        metrics: Arc::new(RelayMetrics::new()),
        shutdown: shutdown.clone(),
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port).parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Transcript relay listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  POST   /api/chat                - Stream a transcript (default profile)");
    info!("  POST   /api/agents/{{name}}/chat  - Stream a transcript (named profile)");
    info!("  GET    /api/health              - Health check");
    info!("  GET    /api/metrics             - Relay metrics");

    // Create shutdown signal handler
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, finishing in-flight streams...");
        shutdown.cancel();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    Ok(())
}
