//! Upstream Message Sources
//!
//! A message source turns one request (prompt + options) into one ordered
//! async stream of [`TurnMessage`]s. The production implementation spawns
//! the agent CLI as a subprocess and parses its stdout JSONL incrementally;
//! dropping the stream kills the subprocess, so abandoning a request cancels
//! the upstream iteration.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{Result, SourceError};
use crate::types::TurnMessage;

/// The ordered async sequence of turn messages for one request.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<TurnMessage>> + Send>>;

/// Options passed to the upstream collaborator for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Allow-list of tool names the agent may invoke.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Backend permission mode (e.g. "default", "acceptEdits").
    #[serde(default)]
    pub permission_mode: Option<String>,

    /// Opaque resume token continuing an existing conversation.
    #[serde(default)]
    pub resume: Option<String>,

    /// System prompt appended to the backend's own.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Named sub-agent definitions available to this request.
    #[serde(default)]
    pub agents: HashMap<String, SubagentDefinition>,
}

/// A delegated, independently configured agent instance the backend may
/// spawn for a focused sub-task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentDefinition {
    pub description: String,
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A pluggable upstream backend: one `query` call yields the full message
/// stream for one request.
pub trait MessageSource: Send + Sync {
    fn query(&self, prompt: &str, options: &QueryOptions) -> Result<MessageStream>;
}

/// Subprocess-backed message source.
///
/// Spawns `command` with `--output-format stream-json` and reads one JSON
/// message per stdout line. The child is spawned with `kill_on_drop`, so a
/// cancelled request (stream dropped mid-iteration) tears the process down.
#[derive(Debug, Clone)]
pub struct CliSource {
    command: String,
    base_args: Vec<String>,
}

impl CliSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            base_args: Vec::new(),
        }
    }

    /// Extra arguments placed before the generated ones (e.g. a model flag).
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    /// Builds the full argument list for one request.
    pub fn build_args(&self, prompt: &str, options: &QueryOptions) -> Result<Vec<String>> {
        let mut args = self.base_args.clone();
        args.push("--print".to_string());
        args.push("--verbose".to_string());
        args.push("--output-format".to_string());
        args.push("stream-json".to_string());

        if !options.allowed_tools.is_empty() {
            args.push("--allowed-tools".to_string());
            args.push(options.allowed_tools.join(","));
        }
        if let Some(mode) = &options.permission_mode {
            args.push("--permission-mode".to_string());
            args.push(mode.clone());
        }
        if let Some(resume) = &options.resume {
            args.push("--resume".to_string());
            args.push(resume.clone());
        }
        if let Some(prompt) = &options.system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(prompt.clone());
        }
        if !options.agents.is_empty() {
            args.push("--agents".to_string());
            args.push(serde_json::to_string(&options.agents)?);
        }

        args.push(prompt.to_string());
        Ok(args)
    }
}

struct ChildLines {
    lines: Lines<BufReader<ChildStdout>>,
    child: Option<Child>,
}

impl MessageSource for CliSource {
    fn query(&self, prompt: &str, options: &QueryOptions) -> Result<MessageStream> {
        let args = self.build_args(prompt, options)?;
        debug!(command = %self.command, "spawning agent backend");

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SourceError::Backend("agent backend has no stdout handle".to_string())
        })?;

        let state = ChildLines {
            lines: BufReader::new(stdout).lines(),
            child: Some(child),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                match state.lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match TurnMessage::from_json_line(&line) {
                            Ok(msg) => return Some((Ok(msg), state)),
                            Err(e) => {
                                // Non-JSON noise on stdout (progress bars,
                                // stray prints) is skipped, not fatal.
                                warn!(error = %e, "skipping unparseable backend line");
                                continue;
                            }
                        }
                    }
                    Ok(None) => {
                        // EOF: reap the child and surface a bad exit status
                        // as one final stream error.
                        if let Some(mut child) = state.child.take() {
                            match child.wait().await {
                                Ok(status) if !status.success() => {
                                    return Some((
                                        Err(SourceError::Backend(format!(
                                            "agent backend exited with {status}"
                                        ))),
                                        state,
                                    ));
                                }
                                Err(e) => return Some((Err(SourceError::Io(e)), state)),
                                Ok(_) => {}
                            }
                        }
                        return None;
                    }
                    Err(e) => return Some((Err(SourceError::Io(e)), state)),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TurnKind;
    use futures::StreamExt;

    #[test]
    fn test_build_args_minimal() {
        let source = CliSource::new("claude");
        let args = source.build_args("hello", &QueryOptions::default()).unwrap();

        assert_eq!(
            args,
            vec![
                "--print",
                "--verbose",
                "--output-format",
                "stream-json",
                "hello"
            ]
        );
    }

    #[test]
    fn test_build_args_full_options() {
        let source = CliSource::new("claude").with_args(vec!["--model".into(), "opus".into()]);
        let options = QueryOptions {
            allowed_tools: vec!["Read".to_string(), "Task".to_string()],
            permission_mode: Some("acceptEdits".to_string()),
            resume: Some("sess-42".to_string()),
            system_prompt: Some("Be terse.".to_string()),
            agents: HashMap::new(),
        };
        let args = source.build_args("do the thing", &options).unwrap();

        assert_eq!(args[0], "--model");
        assert_eq!(args[1], "opus");
        assert!(args.contains(&"--allowed-tools".to_string()));
        assert!(args.contains(&"Read,Task".to_string()));
        assert!(args.contains(&"--permission-mode".to_string()));
        assert!(args.contains(&"--resume".to_string()));
        assert!(args.contains(&"sess-42".to_string()));
        assert!(args.contains(&"--append-system-prompt".to_string()));
        // The prompt is always the final positional argument
        assert_eq!(args.last().unwrap(), "do the thing");
    }

    #[test]
    fn test_build_args_serializes_subagents() {
        let mut agents = HashMap::new();
        agents.insert(
            "researcher".to_string(),
            SubagentDefinition {
                description: "Research focused sub-tasks".to_string(),
                prompt: "You research things.".to_string(),
                tools: vec!["WebSearch".to_string()],
                model: None,
            },
        );
        let source = CliSource::new("claude");
        let options = QueryOptions {
            agents,
            ..QueryOptions::default()
        };
        let args = source.build_args("go", &options).unwrap();

        let idx = args.iter().position(|a| a == "--agents").unwrap();
        let decoded: HashMap<String, SubagentDefinition> =
            serde_json::from_str(&args[idx + 1]).unwrap();
        assert_eq!(decoded["researcher"].tools, vec!["WebSearch"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_as_error() {
        let source = CliSource::new("/definitely/not/a/real/binary");
        let result = source.query("hello", &QueryOptions::default());
        assert!(matches!(result, Err(SourceError::Spawn(_))));
    }

    #[cfg(unix)]
    fn write_fake_backend(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-agent.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_lines_become_turn_messages() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_fake_backend(
            dir.path(),
            concat!(
                "echo '{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"s1\"}'\n",
                "echo 'stray non-json noise'\n",
                "echo '{\"type\":\"result\",\"subtype\":\"success\"}'\n",
            ),
        );

        let source = CliSource::new(script.to_string_lossy().to_string());
        let mut stream = source.query("prompt", &QueryOptions::default()).unwrap();

        let mut messages = Vec::new();
        while let Some(item) = stream.next().await {
            messages.push(item.unwrap());
        }

        // The noise line is skipped, not fatal
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].init_session_id(), Some("s1"));
        assert!(matches!(messages[1].kind, TurnKind::Result { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_yields_trailing_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_fake_backend(
            dir.path(),
            concat!(
                "echo '{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"s1\"}'\n",
                "exit 3\n",
            ),
        );

        let source = CliSource::new(script.to_string_lossy().to_string());
        let mut stream = source.query("prompt", &QueryOptions::default()).unwrap();

        let first = stream.next().await.unwrap();
        assert!(first.is_ok());

        let second = stream.next().await.unwrap();
        match second {
            Err(SourceError::Backend(detail)) => assert!(detail.contains("exited")),
            other => panic!("Expected Backend error, got {:?}", other),
        }

        assert!(stream.next().await.is_none());
    }
}
