//! Prompt template system
//!
//! Loads and renders `.pmt` (prompt template) files for iteration
//! prompts.
//!
//! Template loading chain:
//! 1. `.ralph/prompts/{name}.pmt` (user override)
//! 2. Embedded fallback in the binary
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod builder;

pub use builder::{PlanContext, PromptLoader, RlmContext};
pub use embedded::PLAN_FILE_TEMPLATE;
