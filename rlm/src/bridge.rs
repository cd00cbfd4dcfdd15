//! Depth-limited recursion bridge between scripts and the sub-LLM

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RlmError, RlmResult};

/// Narrow query capability the bridge needs from a provider.
///
/// The call is synchronous and blocking; the bridge guarantees it is
/// never made while the bridge mutex is held.
pub trait SubQuery: Send + Sync {
    fn query(&self, prompt: &str) -> RlmResult<QueryReply>;

    /// Model identifier recorded in call history
    fn model(&self) -> String {
        "unknown".to_string()
    }
}

/// Response from a one-shot sub-LLM query
#[derive(Debug, Clone)]
pub struct QueryReply {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Token totals accumulated across bridge calls
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CallUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One successful sub-LLM call, appended to the history under the mutex
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCall {
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub depth: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct BridgeState {
    depth: usize,
    history: Vec<LlmCall>,
    usage: CallUsage,
}

/// Thread-safe recursion bridge.
///
/// Holds the shared (depth, history, usage) triple behind one mutex.
/// The depth check and increment happen under the lock, the blocking
/// provider query happens outside it, and the decrement plus history
/// append happen under the lock again.
pub struct Bridge {
    client: Arc<dyn SubQuery>,
    max_depth: usize,
    state: Mutex<BridgeState>,
}

impl Bridge {
    pub fn new(client: Arc<dyn SubQuery>, max_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            client,
            max_depth,
            state: Mutex::new(BridgeState::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn depth(&self) -> usize {
        self.lock().depth
    }

    pub fn usage(&self) -> CallUsage {
        self.lock().usage
    }

    pub fn history(&self) -> Vec<LlmCall> {
        self.lock().history.clone()
    }

    /// Run one sub-LLM call against the depth budget
    pub fn handle_request(&self, prompt: &str) -> RlmResult<String> {
        let depth = {
            let mut state = self.lock();
            if state.depth >= self.max_depth {
                debug!(depth = state.depth, max = self.max_depth, "bridge: depth budget spent");
                return Err(RlmError::DepthExceeded(self.max_depth));
            }
            state.depth += 1;
            state.depth
        };

        // Blocking query runs outside the mutex
        let started = Instant::now();
        let result = self.client.query(prompt);
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut state = self.lock();
        state.depth -= 1;
        match result {
            Ok(reply) => {
                debug!(depth, duration_ms, "bridge: sub-query ok");
                state.usage.input_tokens += reply.input_tokens;
                state.usage.output_tokens += reply.output_tokens;
                state.history.push(LlmCall {
                    prompt: prompt.to_string(),
                    response: reply.text.clone(),
                    model: self.client.model(),
                    depth,
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(reply.text)
            }
            Err(e) => {
                debug!(depth, error = %e, "bridge: sub-query failed");
                Err(e)
            }
        }
    }

    /// Sequential batch of sub-LLM calls, failing fast on the first error
    pub fn handle_batch(&self, prompts: &[String]) -> RlmResult<Vec<String>> {
        let mut replies = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            replies.push(self.handle_request(prompt)?);
        }
        Ok(replies)
    }
}
