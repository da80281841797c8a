use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors surfaced by a message source or the SSE consumer.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The agent backend process could not be started.
    #[error("failed to spawn agent backend: {0}")]
    Spawn(#[source] std::io::Error),

    /// I/O failure while reading from the backend.
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend line was not valid JSON.
    #[error("failed to parse backend message: {0}")]
    Parse(#[from] serde_json::Error),

    /// The backend reported or produced a failure mid-stream.
    #[error("agent backend failed: {0}")]
    Backend(String),
}
