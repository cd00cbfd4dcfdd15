//! Plan-oriented mode: a checkpointed task list drives iterations

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::debug;

use super::ModeRunner;
use crate::agent::AgentOutcome;
use crate::config::LoopConfig;
use crate::prompts::{PLAN_FILE_TEMPLATE, PlanContext, PromptLoader};
use crate::render::Renderer;
use crate::verify::VerifyRecord;

pub struct PlanMode {
    loader: PromptLoader,
    #[allow(dead_code)]
    renderer: Option<Renderer>,
}

impl PlanMode {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            loader: PromptLoader::new(&config.root),
            renderer: None,
        }
    }
}

#[async_trait]
impl ModeRunner for PlanMode {
    /// Reset the plan file to the canonical empty template
    async fn initialize(&mut self, config: &LoopConfig) -> Result<()> {
        if let Some(parent) = config.plan_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create plans directory")?;
        }
        tokio::fs::write(&config.plan_path, PLAN_FILE_TEMPLATE)
            .await
            .context("Failed to write plan template")?;
        debug!(plan = ?config.plan_path, "plan file initialized");
        Ok(())
    }

    async fn build_prompt(&mut self, config: &LoopConfig, iteration: u32) -> Result<String> {
        let prompt = tokio::fs::read_to_string(&config.prompt_path)
            .await
            .context(format!("Failed to read prompt {}", config.prompt_path.display()))?;
        let plan = tokio::fs::read_to_string(&config.plan_path)
            .await
            .context(format!("Failed to read plan {}", config.plan_path.display()))?;
        let context = PlanContext::new(prompt, plan, iteration, config.max_iterations, config.no_push);
        self.loader.plan_prompt(&context)
    }

    async fn handle_result(&mut self, _config: &LoopConfig, _outcome: &AgentOutcome, _iteration: u32) -> Result<()> {
        // The agent updates the plan file itself; nothing to do here
        Ok(())
    }

    fn banner_info(&self) -> Option<String> {
        None
    }

    /// Plan mode verifies whenever verification is enabled
    fn should_verify(&self, config: &LoopConfig, _outcome: &AgentOutcome) -> bool {
        config.verify
    }

    async fn store_verification(&mut self, _report: &VerifyRecord) -> Result<()> {
        // Reports are rendered by the controller; plan mode keeps no
        // verification state
        Ok(())
    }

    fn set_output(&mut self, renderer: Renderer) {
        self.renderer = Some(renderer);
    }
}
