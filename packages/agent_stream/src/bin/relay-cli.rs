use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use std::io::Write;

use agent_stream::{DownstreamEvent, SseFrame, SseFrameDecoder, TranscriptReducer};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "CLI client for the transcript relay - streams a live transcript to stdout")]
struct Cli {
    /// Message to send to the agent
    message: String,

    /// Relay server base URL
    #[arg(long, default_value = "http://127.0.0.1:7777")]
    server: String,

    /// Named agent profile to talk to (default profile if omitted)
    #[arg(short, long)]
    agent: Option<String>,

    /// Session ID to resume a prior conversation
    #[arg(short, long)]
    session: Option<String>,

    /// Print raw downstream events as JSON lines instead of rendered text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let url = match &cli.agent {
        Some(profile) => format!("{}/api/agents/{}/chat", cli.server, profile),
        None => format!("{}/api/chat", cli.server),
    };

    let body = serde_json::json!({
        "message": cli.message,
        "sessionId": cli.session,
    });

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach relay at {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        bail!("relay rejected request ({}): {}", status, detail);
    }

    let mut decoder = SseFrameDecoder::new();
    let mut reducer = TranscriptReducer::new();
    let mut stream = response.bytes_stream();
    let mut stdout = std::io::stdout();

    'read: while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("relay stream failed mid-read")?;
        for frame in decoder.feed(&chunk) {
            match frame {
                SseFrame::Event(payload) => {
                    let Some(event) = reducer.apply_payload(&payload) else {
                        continue;
                    };
                    if cli.json {
                        println!("{}", payload);
                        continue;
                    }
                    render_event(&event, &mut stdout)?;
                }
                SseFrame::Done => break 'read,
            }
        }
    }

    if !cli.json {
        println!();
        if let Some(session_id) = &reducer.session_id {
            status_line(&format!("session: {}", session_id));
        }
    }
    if let Some(error) = &reducer.error {
        bail!("{}", error);
    }
    Ok(())
}

/// Renders one event in place: text streams to stdout, everything else goes
/// to stderr so piping the transcript stays clean.
fn render_event(event: &DownstreamEvent, stdout: &mut std::io::Stdout) -> Result<()> {
    match event {
        DownstreamEvent::Text { text } => {
            write!(stdout, "{}", text)?;
            stdout.flush()?;
        }
        DownstreamEvent::Status { status } => status_line(status),
        DownstreamEvent::SubagentStart {
            agent_type,
            description,
        } => status_line(&format!("subagent {}: {}", agent_type, description)),
        DownstreamEvent::AskUserQuestion { questions, .. } => {
            for question in questions {
                status_line(&format!("question: {}", question));
            }
        }
        DownstreamEvent::Error { error, detail } => {
            status_line(&format!("error: {} ({})", error, detail));
        }
        DownstreamEvent::Session { .. }
        | DownstreamEvent::Raw { .. }
        | DownstreamEvent::Complete { .. } => {}
    }
    Ok(())
}

fn status_line(text: &str) {
    eprintln!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), text);
}
