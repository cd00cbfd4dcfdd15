//! Canonical result record and wire markers
//!
//! The [`AgentOutcome`] is the only type that crosses the parser to
//! controller boundary. Both streaming parsers and the in-process RLM
//! runner produce one per iteration, whatever happened on the wire.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The literal token the agent emits to end the run
pub const COMPLETE_MARKER: &str = "<promise>COMPLETE</promise>";

/// The literal token gating verification in RLM mode
pub const VERIFIED_MARKER: &str = "<rlm:verified>true</rlm:verified>";

static PHASE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<rlm:phase>(.*?)</rlm:phase>").unwrap());

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

/// Per-iteration summary record consumed by the controller.
///
/// Invariant: `duration_ms` is always set by the time the controller
/// renders the summary; when a provider reports none the controller
/// injects wall-clock time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutcome {
    pub provider: String,
    pub duration_ms: u64,
    pub turns: u32,
    pub usage: TokenUsage,
    /// USD cost when the provider reports one; never synthesized
    pub cost_usd: Option<f64>,
    pub is_error: bool,
    /// Accumulated assistant text across the whole iteration
    pub text: String,
    pub session_complete: bool,
    /// Trimmed body of the first phase marker, when present
    pub phase: Option<String>,
    pub verified: bool,
}

impl AgentOutcome {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Run the marker detectors over the accumulated text buffer.
    ///
    /// Safe to call repeatedly; markers only ever switch flags on.
    pub fn detect_markers(&mut self) {
        if self.text.contains(COMPLETE_MARKER) {
            self.session_complete = true;
        }
        if self.text.contains(VERIFIED_MARKER) {
            self.verified = true;
        }
        if self.phase.is_none() {
            self.phase = PHASE_MARKER
                .captures(&self.text)
                .map(|caps| caps[1].trim().to_string());
        }
    }
}
