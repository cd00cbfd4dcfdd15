//! Prompt template loading and composition
//!
//! Template loading chain: `.ralph/prompts/{name}.pmt` (user override)
//! then the embedded fallback. Templates use Handlebars syntax.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Context for rendering the plan-mode iteration prompt
#[derive(Debug, Clone, Serialize)]
pub struct PlanContext {
    /// "3/10" or "3/unlimited"
    pub iteration_display: String,
    /// Rough task count the agent should decompose into, from the
    /// iteration bound; absent when unbounded
    pub task_hint: Option<u32>,
    /// Whether the workflow includes the commit step
    pub include_commit: bool,
    pub prompt: String,
    pub plan: String,
}

impl PlanContext {
    pub fn new(prompt: String, plan: String, iteration: u32, max_iterations: u32, no_push: bool) -> Self {
        let iteration_display = if max_iterations == 0 {
            format!("{iteration}/unlimited")
        } else {
            format!("{iteration}/{max_iterations}")
        };
        Self {
            iteration_display,
            task_hint: (max_iterations > 0).then_some(max_iterations),
            include_commit: !no_push,
            prompt,
            plan,
        }
    }
}

/// Context for rendering the RLM-mode preamble
#[derive(Debug, Clone, Serialize)]
pub struct RlmContext {
    pub iteration: u32,
    pub session_id: String,
    pub phase: String,
    pub depth: usize,
    pub max_depth: usize,
    pub state_dir: String,
    pub phase_instructions: String,
    pub prompt: String,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (`.ralph/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader rooted at the working directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        let user_dir = root.as_ref().join(".ralph").join("prompts");
        let exists = user_dir.exists();
        debug!(?user_dir, exists, "PromptLoader::new");
        Self {
            hbs: Handlebars::new(),
            user_dir: exists.then_some(user_dir),
        }
    }

    /// Loader that only uses embedded templates
    pub fn embedded_only() -> Self {
        Self {
            hbs: Handlebars::new(),
            user_dir: None,
        }
    }

    fn load_template(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.user_dir {
            let path = dir.join(format!("{name}.pmt"));
            if path.exists() {
                debug!(?path, "prompt template from user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {e}", path.display()));
            }
        }
        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {name}"))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {template_name}: {e}"))
    }

    /// Compose the plan-mode prompt from already-read file contents
    pub fn plan_prompt(&self, context: &PlanContext) -> Result<String> {
        self.render("plan", context)
    }

    /// Compose the RLM-mode preamble plus request body
    pub fn rlm_prompt(&self, context: &RlmContext) -> Result<String> {
        self.render("rlm_preamble", context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(iteration: u32, max: u32, no_push: bool) -> String {
        let loader = PromptLoader::embedded_only();
        let ctx = PlanContext::new(
            "Fix the login bug".to_string(),
            "## Tasks\n- [ ] a task\n\n## Completed\n".to_string(),
            iteration,
            max,
            no_push,
        );
        loader.plan_prompt(&ctx).unwrap()
    }

    #[test]
    fn test_bounded_iteration_display_and_hint() {
        let prompt = compose(3, 10, false);
        assert!(prompt.contains("iteration 3/10"));
        assert!(prompt.contains("roughly 10 tasks"));
    }

    #[test]
    fn test_unbounded_iteration_display() {
        let prompt = compose(2, 0, false);
        assert!(prompt.contains("iteration 2/unlimited"));
        assert!(!prompt.contains("roughly"));
    }

    #[test]
    fn test_commit_step_omitted_when_no_push() {
        let with_commit = compose(1, 0, false);
        assert!(with_commit.contains("Commit your work"));

        let without = compose(1, 0, true);
        assert!(!without.contains("Commit your work"));
    }

    #[test]
    fn test_plan_fenced_and_marker_present() {
        let prompt = compose(1, 0, false);
        assert!(prompt.contains("```markdown\n## Tasks\n- [ ] a task"));
        assert!(prompt.contains("<promise>COMPLETE</promise>"));
        assert!(prompt.contains("Fix the login bug"));
    }

    #[test]
    fn test_user_override_wins() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join(".ralph").join("prompts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("plan.pmt"), "custom {{iteration_display}}").unwrap();

        let loader = PromptLoader::new(temp.path());
        let ctx = PlanContext::new(String::new(), String::new(), 2, 5, false);
        assert_eq!(loader.plan_prompt(&ctx).unwrap(), "custom 2/5");
    }

    #[test]
    fn test_rlm_prompt_renders_fields() {
        let loader = PromptLoader::embedded_only();
        let ctx = RlmContext {
            iteration: 4,
            session_id: "abc-123".to_string(),
            phase: "SEARCH".to_string(),
            depth: 0,
            max_depth: 3,
            state_dir: ".ralph/state".to_string(),
            phase_instructions: "Explore the codebase.".to_string(),
            prompt: "find the bug".to_string(),
        };
        let prompt = loader.rlm_prompt(&ctx).unwrap();
        assert!(prompt.contains("Iteration 4 | session abc-123 | phase SEARCH | recursion depth 0/3"));
        assert!(prompt.contains("Explore the codebase."));
        assert!(prompt.contains("find the bug"));
    }
}
