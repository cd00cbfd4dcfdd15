//! Provider trait: subprocess construction, stream parsing, one-shot query

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;

use super::error::AgentError;
use super::types::{AgentOutcome, TokenUsage};
use crate::render::Renderer;

/// Stdout of the agent subprocess, handed to the provider's parser
pub type StreamReader = Box<dyn AsyncRead + Send + Unpin>;

/// Response from the one-shot non-streaming query path
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// A vendor-specific agent adapter.
///
/// The controller owns the subprocess lifecycle: it pipes the prompt to
/// stdin, hands stdout to [`parse_stream`](Self::parse_stream), and
/// inherits stderr. Providers only know their command line and their
/// event schema.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Unstarted subprocess descriptor for a streaming iteration
    fn build_command(&self) -> Command;

    /// Consume the event stream line by line, writing each raw line to
    /// `log` before interpretation, and produce the canonical outcome.
    /// A result record is always produced, even without a terminal
    /// event.
    async fn parse_stream(
        &self,
        stdout: StreamReader,
        log: &mut (dyn AsyncWrite + Send + Unpin),
        renderer: &Renderer,
    ) -> Result<AgentOutcome, AgentError>;

    /// One-shot synchronous call used by RLM recursion: non-streaming
    /// output, hard 120 second deadline.
    async fn query(&self, prompt: &str) -> Result<QueryResponse, AgentError>;

    /// Capability check for the in-process path; the controller runs
    /// [`DirectRunner::run_direct`] instead of a subprocess when this
    /// returns Some.
    fn as_direct(&self) -> Option<&dyn DirectRunner> {
        None
    }
}

/// Alternative provider path that bypasses subprocess creation
#[async_trait]
pub trait DirectRunner: Send + Sync {
    async fn run_direct(&self, prompt: &str, renderer: &Renderer) -> Result<AgentOutcome, AgentError>;
}
