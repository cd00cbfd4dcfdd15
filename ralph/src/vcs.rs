//! Two-call git collaborator: current branch and push
//!
//! The loop only ever asks for the branch name once at startup and
//! pushes it after successful iterations. A failed push retries once
//! with `-u origin <branch>` to create the remote tracking branch.

use std::path::PathBuf;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tracing::{debug, warn};

#[async_trait]
pub trait Vcs: Send + Sync {
    async fn current_branch(&self) -> Result<String>;
    async fn push(&self, branch: &str) -> Result<()>;
}

/// Git over subprocess, rooted at the injected working directory
pub struct GitVcs {
    root: PathBuf,
}

impl GitVcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(?args, "git invocation");
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| eyre!("failed to run git: {e}"))
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn current_branch(&self) -> Result<String> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if !output.status.success() {
            return Err(eyre!(
                "git rev-parse failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        let output = self.git(&["push", "origin", branch]).await?;
        if output.status.success() {
            return Ok(());
        }
        warn!(branch, "push failed, retrying with -u to create the tracking branch");
        let retry = self.git(&["push", "-u", "origin", branch]).await?;
        if retry.status.success() {
            return Ok(());
        }
        Err(eyre!(
            "git push failed for branch {branch}: {}",
            String::from_utf8_lossy(&retry.stderr).trim()
        ))
    }
}
