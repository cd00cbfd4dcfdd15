//! Mode runners: the per-iteration strategy
//!
//! A mode controls prompt construction, result interpretation,
//! verification gating and the persisted-state layout. The plan mode
//! checkpoints a task list; the RLM mode drives phased REPL state.

use async_trait::async_trait;
use eyre::Result;

use crate::agent::AgentOutcome;
use crate::config::{LoopConfig, ModeKind};
use crate::render::Renderer;
use crate::verify::VerifyRecord;

mod plan;
mod rlm;

pub use plan::PlanMode;
pub use rlm::{RlmMode, infer_phase};

/// Strategy contract the controller drives once per iteration
#[async_trait]
pub trait ModeRunner: Send {
    /// Prepare persisted state for a fresh run
    async fn initialize(&mut self, config: &LoopConfig) -> Result<()>;

    /// Assemble the full prompt for this iteration
    async fn build_prompt(&mut self, config: &LoopConfig, iteration: u32) -> Result<String>;

    /// Interpret the canonical result after the iteration
    async fn handle_result(&mut self, config: &LoopConfig, outcome: &AgentOutcome, iteration: u32) -> Result<()>;

    /// Extra banner text for the iteration header (the RLM phase)
    fn banner_info(&self) -> Option<String>;

    /// Whether verification may run for this outcome
    fn should_verify(&self, config: &LoopConfig, outcome: &AgentOutcome) -> bool;

    /// Persist a verification report
    async fn store_verification(&mut self, report: &VerifyRecord) -> Result<()>;

    /// Wire in the output sink
    fn set_output(&mut self, renderer: Renderer);
}

/// Create the runner selected by the run configuration
pub fn create_mode(config: &LoopConfig) -> Box<dyn ModeRunner> {
    match config.mode {
        ModeKind::Plan => Box::new(PlanMode::new(config)),
        ModeKind::Rlm => Box::new(RlmMode::new(config)),
    }
}
