//! Run configuration: CLI flags, environment, optional config file
//!
//! Precedence for every knob: CLI flag, then `GORALPH_AGENT` (agent
//! only), then `.ralph/config.yml`, then the built-in default.

use std::path::{Path, PathBuf};

use chrono::Local;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::LoopArgs;

/// Environment variable overriding the default agent selector
pub const ENV_AGENT: &str = "GORALPH_AGENT";

/// Which vendor adapter drives iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
    Rlm,
}

impl std::str::FromStr for AgentKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "rlm" => Ok(Self::Rlm),
            other => Err(eyre!("Unknown agent '{other}'. Use: claude, codex, or rlm")),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Rlm => "rlm",
        };
        write!(f, "{name}")
    }
}

/// Which iteration strategy interprets results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeKind {
    #[default]
    Plan,
    Rlm,
}

/// Optional `.ralph/config.yml` defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub no_push: Option<bool>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub verify: Option<bool>,
    #[serde(default)]
    pub verify_commands: Option<Vec<String>>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Load from `.ralph/config.yml`; absent file means defaults
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(".ralph").join("config.yml");
        if !path.exists() {
            debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| eyre!("Failed to read {}: {e}", path.display()))?;
        serde_yaml::from_str(&content).map_err(|e| eyre!("Invalid config {}: {e}", path.display()))
    }

    /// Log level only, readable before full config resolution
    pub fn load_log_level(root: &Path) -> Option<String> {
        Self::load(root).ok().and_then(|c| c.log_level)
    }
}

/// Immutable per-run configuration
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Injected working root; the VCS collaborator and the filesystem
    /// helpers all resolve against this
    pub root: PathBuf,
    pub prompt_path: PathBuf,
    /// Per-session plan file, timestamped for uniqueness
    pub plan_path: PathBuf,
    /// Zero means unbounded
    pub max_iterations: u32,
    pub no_push: bool,
    pub agent: AgentKind,
    pub mode: ModeKind,
    /// RLM recursion bound
    pub max_depth: usize,
    pub verify: bool,
    /// Empty means auto-detect by project type
    pub verify_commands: Vec<String>,
}

impl LoopConfig {
    /// Resolve flags, environment and file config into a run config
    pub fn resolve(root: PathBuf, prompt_file: &str, args: &LoopArgs, file: &FileConfig) -> Result<Self> {
        let agent: AgentKind = match &args.agent {
            Some(flag) => flag.parse()?,
            None => match std::env::var(ENV_AGENT) {
                Ok(env) if !env.is_empty() => env.parse()?,
                _ => match &file.agent {
                    Some(configured) => configured.parse()?,
                    None => AgentKind::Claude,
                },
            },
        };

        let mode = if args.rlm || agent == AgentKind::Rlm {
            ModeKind::Rlm
        } else {
            ModeKind::Plan
        };

        let timestamp = Local::now().format("%Y%m%dT%H%M%S%.3f");
        let plan_path = root
            .join(".ralph")
            .join("plans")
            .join(format!("implementation_plan_{timestamp}.md"));

        Ok(Self {
            prompt_path: root.join(".ralph").join(prompt_file),
            plan_path,
            max_iterations: args.max.or(file.max_iterations).unwrap_or(0),
            no_push: args.no_push || file.no_push.unwrap_or(false),
            agent,
            mode,
            max_depth: args.max_depth.or(file.max_depth).unwrap_or(3),
            verify: args.verify || file.verify.unwrap_or(false),
            verify_commands: file.verify_commands.clone().unwrap_or_default(),
            root,
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".ralph").join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(".ralph").join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn args() -> LoopArgs {
        LoopArgs::default()
    }

    #[test]
    fn test_agent_kind_from_str() {
        assert_eq!("claude".parse::<AgentKind>().unwrap(), AgentKind::Claude);
        assert_eq!("CODEX".parse::<AgentKind>().unwrap(), AgentKind::Codex);
        assert_eq!("rlm".parse::<AgentKind>().unwrap(), AgentKind::Rlm);
        assert!("gemini".parse::<AgentKind>().is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_defaults() {
        unsafe { std::env::remove_var(ENV_AGENT) };
        let config = LoopConfig::resolve(PathBuf::from("/tmp/w"), "PROMPT.md", &args(), &FileConfig::default()).unwrap();
        assert_eq!(config.agent, AgentKind::Claude);
        assert_eq!(config.mode, ModeKind::Plan);
        assert_eq!(config.max_iterations, 0);
        assert_eq!(config.max_depth, 3);
        assert!(!config.no_push);
        assert_eq!(config.prompt_path, PathBuf::from("/tmp/w/.ralph/PROMPT.md"));
    }

    #[test]
    #[serial]
    fn test_env_selects_agent_and_flag_wins() {
        unsafe { std::env::set_var(ENV_AGENT, "codex") };
        let config = LoopConfig::resolve(PathBuf::from("/tmp/w"), "PROMPT.md", &args(), &FileConfig::default()).unwrap();
        assert_eq!(config.agent, AgentKind::Codex);

        let mut flagged = args();
        flagged.agent = Some("rlm".to_string());
        let config = LoopConfig::resolve(PathBuf::from("/tmp/w"), "PROMPT.md", &flagged, &FileConfig::default()).unwrap();
        assert_eq!(config.agent, AgentKind::Rlm);
        assert_eq!(config.mode, ModeKind::Rlm);
        unsafe { std::env::remove_var(ENV_AGENT) };
    }

    #[test]
    #[serial]
    fn test_rlm_flag_switches_mode() {
        unsafe { std::env::remove_var(ENV_AGENT) };
        let mut flagged = args();
        flagged.rlm = true;
        let config = LoopConfig::resolve(PathBuf::from("/tmp/w"), "PROMPT.md", &flagged, &FileConfig::default()).unwrap();
        assert_eq!(config.agent, AgentKind::Claude);
        assert_eq!(config.mode, ModeKind::Rlm);
    }

    #[test]
    #[serial]
    fn test_file_config_fills_gaps() {
        unsafe { std::env::remove_var(ENV_AGENT) };
        let file = FileConfig {
            max_iterations: Some(7),
            verify: Some(true),
            verify_commands: Some(vec!["make test".to_string()]),
            ..FileConfig::default()
        };
        let mut flagged = args();
        flagged.max = Some(3);
        let config = LoopConfig::resolve(PathBuf::from("/tmp/w"), "PROMPT.md", &flagged, &file).unwrap();
        assert_eq!(config.max_iterations, 3, "flag beats file");
        assert!(config.verify);
        assert_eq!(config.verify_commands, vec!["make test"]);
    }

    #[test]
    fn test_plan_path_shape() {
        let config =
            LoopConfig::resolve(PathBuf::from("/tmp/w"), "PROMPT.md", &args(), &FileConfig::default()).unwrap();
        let name = config.plan_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("implementation_plan_"));
        assert!(name.ends_with(".md"));
        // YYYYMMDDTHHMMSS.mmm
        let stem = name
            .trim_start_matches("implementation_plan_")
            .trim_end_matches(".md");
        assert_eq!(stem.len(), "20260101T120000.000".len());
        assert!(stem.contains('T') && stem.contains('.'));
    }
}
