//! Embedded prompt templates
//!
//! Compiled into the binary from .pmt files at build time.

/// Plan-mode iteration prompt (header, request, instructions, plan)
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// RLM-mode iteration preamble
pub const RLM_PREAMBLE: &str = include_str!("../../prompts/rlm_preamble.pmt");

/// Canonical empty plan file, written on initialize and reset
pub const PLAN_FILE_TEMPLATE: &str = "## Tasks\n\n<!-- One task per line: - [ ] description -->\n\n## Completed\n\n<!-- Finished tasks move here -->\n";

/// Get the embedded template by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "plan" => Some(PLAN),
        "rlm_preamble" => Some(RLM_PREAMBLE),
        _ => None,
    }
}
