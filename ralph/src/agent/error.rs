//! Agent provider error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving an agent subprocess
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn {provider}: {source}")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider} exited with status {code}")]
    Exit { provider: String, code: i32 },

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
