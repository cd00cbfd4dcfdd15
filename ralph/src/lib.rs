//! Ralph - iteration driver for autonomous coding agents
//!
//! Ralph repeatedly invokes an external coding agent against a prompt
//! file until the agent emits the completion marker or an iteration
//! bound is hit. Every iteration starts a fresh agent context; progress
//! persists in files (the plan or the RLM state directory) and in git,
//! which Ralph pushes after each successful iteration.
//!
//! # Core Concepts
//!
//! - **Fresh context always**: each iteration is a new agent invocation
//! - **State in files**: the task record accumulates in `.ralph/`, not memory
//! - **Completion by marker**: the agent ends the run by emitting
//!   `<promise>COMPLETE</promise>` in its output
//! - **Checkpoint to git**: successful iterations push the current branch
//!
//! # Modules
//!
//! - [`agent`] - provider abstraction and the streaming event parsers
//! - [`modes`] - plan-oriented and RLM-oriented iteration strategies
//! - [`prompts`] - prompt template loading and composition
//! - [`r#loop`] - the iteration controller
//! - [`verify`] - verification command runner with project auto-detection
//! - [`vcs`] - the two-call git collaborator
//! - [`render`] - write-only terminal sink

pub mod agent;
pub mod cli;
pub mod config;
pub mod modes;
pub mod prompts;
pub mod render;
pub mod vcs;
pub mod verify;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use agent::{AgentError, AgentOutcome, AgentProvider, QueryResponse, TokenUsage, create_provider};
pub use config::{AgentKind, FileConfig, LoopConfig, ModeKind};
pub use modes::{ModeRunner, create_mode};
pub use prompts::{PlanContext, PromptLoader};
pub use r#loop::{LoopEngine, LoopSummary};
pub use render::Renderer;
pub use vcs::{GitVcs, Vcs};
pub use verify::Verifier;
