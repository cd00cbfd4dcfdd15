//! LoopEngine - composes provider, mode, verifier and VCS into the
//! outer iteration loop
//!
//! Per iteration: build the prompt, run the agent (subprocess stream or
//! in-process direct path), interpret the canonical outcome, optionally
//! verify, then either stop on the completion marker or checkpoint by
//! pushing the branch.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use eyre::{Context, Result, bail};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::agent::{AgentError, AgentOutcome, AgentProvider};
use crate::config::LoopConfig;
use crate::modes::ModeRunner;
use crate::render::Renderer;
use crate::vcs::Vcs;
use crate::verify::Verifier;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u32,
    /// True when the agent emitted the completion marker
    pub completed: bool,
}

/// Loop execution engine
pub struct LoopEngine {
    config: LoopConfig,
    provider: Arc<dyn AgentProvider>,
    mode: Box<dyn ModeRunner>,
    vcs: Arc<dyn Vcs>,
    renderer: Renderer,
    iteration: u32,
}

impl LoopEngine {
    pub fn new(
        config: LoopConfig,
        provider: Arc<dyn AgentProvider>,
        mode: Box<dyn ModeRunner>,
        vcs: Arc<dyn Vcs>,
        renderer: Renderer,
    ) -> Self {
        Self {
            config,
            provider,
            mode,
            vcs,
            renderer,
            iteration: 0,
        }
    }

    /// Run the loop until completion, the iteration bound, or a fatal
    /// error
    pub async fn run(&mut self) -> Result<LoopSummary> {
        if !self.config.prompt_path.exists() {
            bail!("prompt file not found: {}", self.config.prompt_path.display());
        }
        tokio::fs::create_dir_all(self.config.plan_path.parent().unwrap_or(&self.config.root))
            .await
            .context("Failed to create plans directory")?;
        tokio::fs::create_dir_all(self.config.logs_dir())
            .await
            .context("Failed to create logs directory")?;

        self.mode.set_output(self.renderer.clone());
        self.mode.initialize(&self.config).await?;

        // Branch identity is only needed when pushes are enabled
        let branch = if self.config.no_push {
            None
        } else {
            Some(
                self.vcs
                    .current_branch()
                    .await
                    .context("Failed to read current branch")?,
            )
        };

        self.renderer.header(
            self.provider.name(),
            self.provider.model(),
            &self.config.prompt_path.display().to_string(),
            self.config.max_iterations,
        );
        let verifier = Verifier::new(&self.config.root, self.config.verify_commands.clone());

        loop {
            self.iteration += 1;
            let iteration = self.iteration;
            if self.config.max_iterations > 0 && iteration > self.config.max_iterations {
                info!(max = self.config.max_iterations, "iteration bound reached");
                self.renderer.max_iterations(self.config.max_iterations);
                return Ok(LoopSummary {
                    iterations: iteration - 1,
                    completed: false,
                });
            }

            let prompt = self.mode.build_prompt(&self.config, iteration).await?;
            self.renderer
                .iteration(iteration, self.config.max_iterations, self.mode.banner_info().as_deref());

            let outcome = self.run_agent(&prompt, iteration).await?;
            self.renderer.summary(&outcome);
            self.mode.handle_result(&self.config, &outcome, iteration).await?;

            let mut verify_failed = false;
            if self.config.verify && self.mode.should_verify(&self.config, &outcome) && verifier.is_active() {
                let report = verifier.run(iteration).await;
                self.mode.store_verification(&report).await?;
                self.renderer.verify_report(&report);
                if !report.passed {
                    warn!(iteration, "verification failed, skipping push");
                    verify_failed = true;
                }
            }

            if outcome.session_complete {
                info!(iteration, "session complete");
                self.renderer.completion();
                return Ok(LoopSummary {
                    iterations: iteration,
                    completed: true,
                });
            }

            if let Some(branch) = &branch {
                if !verify_failed {
                    self.vcs
                        .push(branch)
                        .await
                        .wrap_err_with(|| format!("push failed after iteration {iteration}"))?;
                    debug!(iteration, branch, "checkpoint pushed");
                }
            }
        }
    }

    /// Run one agent invocation and guarantee a duration on the outcome
    async fn run_agent(&self, prompt: &str, iteration: u32) -> Result<AgentOutcome> {
        let started = Instant::now();
        let result = match self.provider.as_direct() {
            Some(direct) => direct.run_direct(prompt, &self.renderer).await,
            None => self.run_subprocess(prompt).await,
        };
        let mut outcome = result.wrap_err_with(|| {
            format!("iteration {iteration} failed (provider {})", self.provider.name())
        })?;
        if outcome.duration_ms == 0 {
            outcome.duration_ms = started.elapsed().as_millis() as u64;
        }
        Ok(outcome)
    }

    /// Subprocess path: pipe the prompt to stdin, parse stdout to EOF,
    /// then reap the child. A non-zero exit is fatal unless the stream
    /// already carried an error event.
    async fn run_subprocess(&self, prompt: &str) -> Result<AgentOutcome, AgentError> {
        let log_name = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let log_path = self.config.logs_dir().join(format!("{log_name}.jsonl"));
        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;
        debug!(?log_path, "raw event log opened");

        let mut cmd = self.provider.build_command();
        cmd.current_dir(&self.config.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = cmd.spawn().map_err(|e| AgentError::Spawn {
            provider: self.provider.name().to_string(),
            source: e,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::InvalidResponse("no stdin pipe".to_string()))?;
        stdin.write_all(prompt.as_bytes()).await?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::InvalidResponse("no stdout pipe".to_string()))?;
        let outcome = self
            .provider
            .parse_stream(Box::new(stdout), &mut log, &self.renderer)
            .await?;
        log.flush().await?;

        let status = child.wait().await?;
        if !status.success() && !outcome.is_error {
            return Err(AgentError::Exit {
                provider: self.provider.name().to_string(),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(outcome)
    }
}
