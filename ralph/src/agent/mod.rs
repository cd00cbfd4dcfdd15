//! Agent providers and their streaming parsers
//!
//! A provider turns one vendor CLI into two capabilities: a streaming
//! subprocess iteration (command + stdout parser) and a one-shot
//! synchronous query used by RLM recursion. The RLM "provider" is the
//! odd one out: it runs the REPL in-process and is selected through the
//! [`AgentProvider::as_direct`] capability check.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

mod claude;
mod codex;
mod error;
mod provider;
mod rlm;
mod stream;
mod types;

pub use claude::ClaudeAgent;
pub use codex::CodexAgent;
pub use error::AgentError;
pub use provider::{AgentProvider, DirectRunner, QueryResponse, StreamReader};
pub use rlm::RlmAgent;
pub use stream::StreamState;
pub use types::{AgentOutcome, COMPLETE_MARKER, TokenUsage, VERIFIED_MARKER};

#[cfg(test)]
pub use provider::mock;

/// Hard deadline for the one-shot query path
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(120);

use crate::config::{AgentKind, LoopConfig};

/// Create the provider selected by the run configuration.
///
/// The RLM provider wraps a claude adapter for its sub-queries.
pub fn create_provider(config: &LoopConfig) -> Arc<dyn AgentProvider> {
    debug!(agent = %config.agent, "create_provider: called");
    match config.agent {
        AgentKind::Claude => Arc::new(ClaudeAgent::new()),
        AgentKind::Codex => Arc::new(CodexAgent::new()),
        AgentKind::Rlm => Arc::new(RlmAgent::new(
            Arc::new(ClaudeAgent::new()),
            config.root.clone(),
            config.max_depth,
        )),
    }
}
