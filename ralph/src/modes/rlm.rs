//! RLM-oriented mode: phased REPL state drives iterations
//!
//! State lives in `.ralph/state/` (session, context manifest, history
//! journal, per-record directories). The phase for each iteration is
//! inferred from what the state already shows, so a crashed run resumes
//! where the evidence left off.

use async_trait::async_trait;
use chrono::Utc;
use eyre::{Context, Result};
use rlmcore::{ContextManifest, HistoryEntry, Phase, StateStore, VerifyRecord};
use tracing::{debug, info};

use super::ModeRunner;
use crate::agent::AgentOutcome;
use crate::config::LoopConfig;
use crate::prompts::{PromptLoader, RlmContext};
use crate::render::Renderer;

pub struct RlmMode {
    store: StateStore,
    loader: PromptLoader,
    renderer: Option<Renderer>,
}

impl RlmMode {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            store: StateStore::new(config.state_dir()),
            loader: PromptLoader::new(&config.root),
            renderer: None,
        }
    }
}

/// Phase inference, first match wins:
/// 1. iteration <= 1 is always PLAN
/// 2. no discoveries yet means SEARCH
/// 3. an empty focus file set means NARROW
/// 4. a failed latest verification means ACT
/// 5. otherwise advance the cycle from the previous phase
pub fn infer_phase(
    iteration: u32,
    manifest: &ContextManifest,
    latest_verification: Option<&VerifyRecord>,
    previous: Phase,
) -> Phase {
    if iteration <= 1 {
        return Phase::Plan;
    }
    if manifest.discoveries.is_empty() {
        return Phase::Search;
    }
    if manifest.focus.files.is_empty() {
        return Phase::Narrow;
    }
    if let Some(report) = latest_verification {
        if !report.passed {
            return Phase::Act;
        }
    }
    previous.next()
}

fn phase_instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Plan => {
            "Read the request and the repository top level. Write the task \
             summary, objectives and constraints into context.json, then \
             outline your approach as discoveries of type \"plan\"."
        }
        Phase::Search => {
            "Explore the codebase broadly. Record every relevant file, \
             function and pattern you find as a discovery in context.json."
        }
        Phase::Narrow => {
            "Choose the minimal set of files, functions and tests that the \
             change needs, and write it into the focus set in context.json."
        }
        Phase::Act => {
            "Make the change on the focused files. Keep edits small and \
             record what you touched as discoveries of type \"change\"."
        }
        Phase::Verify => {
            "Run the project's checks on what you changed. If they pass, \
             emit the verified marker; if not, record the failures as \
             discoveries and do not emit it."
        }
    }
}

#[async_trait]
impl ModeRunner for RlmMode {
    /// Wipe the state directory and start a fresh session
    async fn initialize(&mut self, _config: &LoopConfig) -> Result<()> {
        let session = self.store.initialize().context("Failed to initialize RLM state")?;
        info!(session_id = %session.session_id, "rlm mode initialized");
        Ok(())
    }

    async fn build_prompt(&mut self, config: &LoopConfig, iteration: u32) -> Result<String> {
        let mut session = self.store.read_session().context("Failed to read session state")?;
        session.iteration = iteration;

        let manifest = self.store.read_manifest().context("Failed to read context manifest")?;
        let latest = self
            .store
            .latest_verification()
            .context("Failed to read verification records")?;
        let phase = infer_phase(iteration, &manifest, latest.as_ref(), session.phase);
        debug!(iteration, %phase, "rlm: phase inferred");
        session.phase = phase;
        self.store.write_session(&session).context("Failed to persist session state")?;

        let prompt = tokio::fs::read_to_string(&config.prompt_path)
            .await
            .context(format!("Failed to read prompt {}", config.prompt_path.display()))?;
        let context = RlmContext {
            iteration,
            session_id: session.session_id.clone(),
            phase: phase.name().to_string(),
            depth: session.depth,
            max_depth: config.max_depth,
            state_dir: ".ralph/state".to_string(),
            phase_instructions: phase_instructions(phase).to_string(),
            prompt,
        };
        self.loader.rlm_prompt(&context)
    }

    /// Persist a phase marker and journal the iteration
    async fn handle_result(&mut self, _config: &LoopConfig, outcome: &AgentOutcome, iteration: u32) -> Result<()> {
        let mut session = self.store.read_session().context("Failed to read session state")?;

        if let Some(marker) = &outcome.phase {
            if let Some(phase) = Phase::parse(marker) {
                if phase != session.phase {
                    if let Some(renderer) = &self.renderer {
                        renderer.notice(&format!("phase → {phase}"));
                    }
                }
                session.phase = phase;
            } else {
                debug!(%marker, "ignoring unknown phase marker");
            }
        }
        self.store.write_session(&session).context("Failed to persist session state")?;

        self.store
            .append_history(&HistoryEntry {
                iteration,
                phase: session.phase,
                session_complete: outcome.session_complete,
                verified: outcome.verified,
                error: outcome.is_error,
                timestamp: Utc::now(),
            })
            .context("Failed to append history")?;
        Ok(())
    }

    fn banner_info(&self) -> Option<String> {
        self.store.read_session().ok().map(|s| s.phase.name().to_string())
    }

    /// RLM mode verifies only when the agent asserted verification
    fn should_verify(&self, config: &LoopConfig, outcome: &AgentOutcome) -> bool {
        config.verify && outcome.verified
    }

    async fn store_verification(&mut self, report: &VerifyRecord) -> Result<()> {
        self.store
            .write_verification(report)
            .context("Failed to store verification report")?;
        Ok(())
    }

    fn set_output(&mut self, renderer: Renderer) {
        self.renderer = Some(renderer);
    }
}
