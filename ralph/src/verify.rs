//! Verification: run configured or auto-detected project checks
//!
//! Commands are split on whitespace and executed without a shell; exit
//! status zero is a pass and the overall report passes iff every check
//! passes.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

pub use rlmcore::{VerifyCheckRecord, VerifyRecord};

/// Probe the working directory for a known project type and return its
/// check commands. The first matching probe wins.
pub fn auto_detect(root: &Path) -> Vec<String> {
    if root.join("go.mod").exists() {
        return vec!["go build ./...".to_string(), "go test ./...".to_string()];
    }

    let package_json = root.join("package.json");
    if package_json.exists() {
        let mut commands = Vec::new();
        if let Ok(content) = std::fs::read_to_string(&package_json) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) {
                let scripts = &json["scripts"];
                if scripts.get("build").is_some() {
                    commands.push("npm run build".to_string());
                }
                if scripts.get("test").is_some() {
                    commands.push("npm test".to_string());
                }
            }
        }
        if !commands.is_empty() {
            return commands;
        }
    }

    if root.join("Cargo.toml").exists() {
        return vec!["cargo build".to_string(), "cargo test".to_string()];
    }

    if root.join("pyproject.toml").exists() || root.join("setup.py").exists() {
        return vec!["pytest".to_string()];
    }

    let makefile = root.join("Makefile");
    if makefile.exists() {
        if let Ok(content) = std::fs::read_to_string(&makefile) {
            if content.lines().any(|l| l.starts_with("test:")) {
                return vec!["make test".to_string()];
            }
            if content.lines().any(|l| l.starts_with("check:")) {
                return vec!["make check".to_string()];
            }
        }
    }

    Vec::new()
}

/// Runs the check list and produces structured reports
pub struct Verifier {
    root: PathBuf,
    commands: Vec<String>,
}

impl Verifier {
    /// An empty command list auto-detects by project type
    pub fn new(root: impl Into<PathBuf>, commands: Vec<String>) -> Self {
        let root = root.into();
        let commands = if commands.is_empty() { auto_detect(&root) } else { commands };
        debug!(?commands, "verifier configured");
        Self { root, commands }
    }

    /// False when nothing was configured and nothing was detected
    pub fn is_active(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Run every check; the overall flag is the AND of all checks
    pub async fn run(&self, iteration: u32) -> VerifyRecord {
        let mut checks = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            checks.push(self.run_check(command).await);
        }
        let passed = checks.iter().all(|c| c.passed);
        info!(iteration, passed, check_count = checks.len(), "verification finished");
        VerifyRecord {
            iteration,
            passed,
            checks,
            timestamp: Utc::now(),
        }
    }

    /// Whitespace-split argv, no shell expansion
    async fn run_check(&self, command: &str) -> VerifyCheckRecord {
        let argv: Vec<&str> = command.split_whitespace().collect();
        let Some((program, args)) = argv.split_first() else {
            return VerifyCheckRecord {
                name: command.to_string(),
                command: command.to_string(),
                passed: false,
                output: String::new(),
                error: Some("empty command".to_string()),
            };
        };

        debug!(%command, "running verification check");
        match tokio::process::Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
        {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                VerifyCheckRecord {
                    name: command.to_string(),
                    command: command.to_string(),
                    passed: output.status.success(),
                    output: combined,
                    error: None,
                }
            }
            Err(e) => VerifyCheckRecord {
                name: command.to_string(),
                command: command.to_string(),
                passed: false,
                output: String::new(),
                error: Some(e.to_string()),
            },
        }
    }
}
