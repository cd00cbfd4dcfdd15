//! Error types for the RLM core

use thiserror::Error;

/// Errors that can occur in the RLM core
#[derive(Debug, Error)]
pub enum RlmError {
    /// Script compilation or runtime failure, surfaced to the model
    #[error("script error: {0}")]
    Script(String),

    /// The script deadline elapsed before the script finished
    #[error("execution timed out")]
    Timeout,

    /// The recursion bridge refused a call because the depth budget is spent
    #[error("max recursion depth ({0}) exceeded")]
    DepthExceeded(usize),

    /// The synchronous sub-LLM query failed
    #[error("sub-query failed: {0}")]
    Query(String),

    /// State store record is missing or malformed
    #[error("state store error: {0}")]
    Store(String),

    /// The REPL session spent its turn budget without an answer
    #[error("no answer after {0} turns")]
    TurnsExhausted(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate
pub type RlmResult<T> = Result<T, RlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_exceeded_message() {
        let err = RlmError::DepthExceeded(2);
        assert_eq!(err.to_string(), "max recursion depth (2) exceeded");
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(RlmError::Timeout.to_string(), "execution timed out");
    }
}
