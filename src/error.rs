use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the training harness
#[derive(Error, Debug)]
pub enum StrikerError {
    // CLI misuse: fatal, reported on stderr with a non-zero exit
    #[error("usage error: {0}")]
    Usage(String),

    #[error("unknown environment id: {0}")]
    UnknownEnv(String),

    // A parallel worker failed to start or stopped responding
    #[error("environment worker {slot} failed to start: {reason}")]
    WorkerStart { slot: usize, reason: String },

    #[error("environment worker {slot} is not responding: {reason}")]
    WorkerDead { slot: usize, reason: String },

    // Policy or statistics artifact missing/corrupt
    #[error("failed to load artifact {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("environment error: {0}")]
    Env(String),

    #[error("rendering unavailable: {0}")]
    Render(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrikerError {
    /// Process exit code for a fatal error surfaced in `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            StrikerError::Usage(_) => 1,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, StrikerError>;
