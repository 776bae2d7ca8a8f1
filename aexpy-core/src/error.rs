//! Error type shared by every pipeline stage.

use std::path::PathBuf;

/// Errors raised by the analysis pipeline.
///
/// Per-entry faults never surface here; they are logged and the entry is
/// skipped. These variants cover stage and infrastructure faults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// A subprocess exited with a non-zero status.
    #[error("command `{command}` failed with exit code {code:?}: {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The inspector output did not follow the transfer protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A stage was handed an input it refuses to process.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("environment error: {0}")]
    Environment(String),

    /// Neither side of a trigger verification could be prepared.
    #[error("verification failed: {0}")]
    Verification(String),

    #[error("no top level module could be extracted from {0:?}")]
    NoTopModule(Vec<String>),

    #[error("path does not exist: {0}")]
    MissingPath(PathBuf),

    #[error("{0}")]
    Other(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
