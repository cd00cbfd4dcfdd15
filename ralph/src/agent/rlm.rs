//! RLM provider: runs the REPL in-process instead of a subprocess
//!
//! Selected through the [`AgentProvider::as_direct`] capability check.
//! Wraps a subprocess provider (claude by default) whose one-shot
//! `query` serves both the REPL's own turns and the recursion bridge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rlmcore::{FsSandbox, QueryReply, ReplSession, RlmError, RlmResult, SessionConfig, StateStore, SubQuery};
use tokio::io::AsyncWrite;
use tokio::process::Command;
use tracing::{debug, info};

use super::error::AgentError;
use super::provider::{AgentProvider, DirectRunner, QueryResponse, StreamReader};
use super::types::AgentOutcome;
use crate::render::Renderer;

/// In-process REPL provider
pub struct RlmAgent {
    inner: Arc<dyn AgentProvider>,
    root: PathBuf,
    max_depth: usize,
}

impl RlmAgent {
    pub fn new(inner: Arc<dyn AgentProvider>, root: PathBuf, max_depth: usize) -> Self {
        Self { inner, root, max_depth }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(".ralph").join("state")
    }
}

#[async_trait]
impl AgentProvider for RlmAgent {
    fn name(&self) -> &str {
        "rlm"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn build_command(&self) -> Command {
        // Never spawned: the controller takes the direct path. Kept so
        // the trait stays total for every provider.
        self.inner.build_command()
    }

    async fn parse_stream(
        &self,
        _stdout: StreamReader,
        _log: &mut (dyn AsyncWrite + Send + Unpin),
        _renderer: &Renderer,
    ) -> Result<AgentOutcome, AgentError> {
        Err(AgentError::InvalidResponse(
            "rlm provider runs in-process; no stream to parse".to_string(),
        ))
    }

    async fn query(&self, prompt: &str) -> Result<QueryResponse, AgentError> {
        self.inner.query(prompt).await
    }

    fn as_direct(&self) -> Option<&dyn DirectRunner> {
        Some(self)
    }
}

#[async_trait]
impl DirectRunner for RlmAgent {
    async fn run_direct(&self, prompt: &str, renderer: &Renderer) -> Result<AgentOutcome, AgentError> {
        let started = Instant::now();

        // The script `context` binding is the accumulated manifest;
        // empty on the first iteration.
        let context = StateStore::new(self.state_dir())
            .manifest_text()
            .unwrap_or_default();

        let client = Arc::new(BlockingQuery {
            provider: self.inner.clone(),
            handle: tokio::runtime::Handle::current(),
        });
        let session = ReplSession::new(
            client,
            FsSandbox::new(self.root.clone()),
            SessionConfig {
                max_depth: self.max_depth,
                ..SessionConfig::default()
            },
        );

        let prompt = prompt.to_string();
        let observer_renderer = renderer.clone();
        debug!(max_depth = self.max_depth, "rlm: starting repl session");
        let result = tokio::task::spawn_blocking(move || {
            session.run(&prompt, &context, |event| match event {
                rlmcore::session::SessionEvent::Assistant(text) => {
                    observer_renderer.text(text);
                    observer_renderer.text("\n");
                }
                rlmcore::session::SessionEvent::ScriptOutput(out) => {
                    observer_renderer.text(out);
                }
            })
        })
        .await
        .map_err(|e| AgentError::InvalidResponse(format!("rlm session panicked: {e}")))?
        .map_err(|e| AgentError::InvalidResponse(format!("rlm session: {e}")))?;

        let mut outcome = AgentOutcome::new("rlm");
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome.turns = result.turns;
        outcome.usage.input_tokens = result.usage.input_tokens;
        outcome.usage.output_tokens = result.usage.output_tokens;
        outcome.text = result.text;
        outcome.detect_markers();
        if let Some(answer) = &result.answer {
            info!(turns = result.turns, "rlm: session answered");
            outcome.session_complete = true;
            renderer.line(&format!("\nanswer: {answer}"));
        }
        Ok(outcome)
    }
}

/// Sync adapter from the bridge's blocking contract onto the async
/// provider query. Runs on a blocking thread, so `block_on` is safe.
struct BlockingQuery {
    provider: Arc<dyn AgentProvider>,
    handle: tokio::runtime::Handle,
}

impl SubQuery for BlockingQuery {
    fn query(&self, prompt: &str) -> RlmResult<QueryReply> {
        let provider = self.provider.clone();
        let prompt = prompt.to_string();
        let response = self
            .handle
            .block_on(async move { provider.query(&prompt).await })
            .map_err(|e| RlmError::Query(e.to_string()))?;
        Ok(QueryReply {
            text: response.text,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }

    fn model(&self) -> String {
        self.provider.model().to_string()
    }
}
