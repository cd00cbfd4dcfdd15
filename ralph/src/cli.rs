//! CLI command definitions

use clap::{Args, Parser, Subcommand};

/// Ralph - iteration driver for autonomous coding agents
#[derive(Parser)]
#[command(
    name = "ralph",
    about = "Drives a coding agent against a prompt file until it signals completion",
    version
)]
pub struct Cli {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands; each drives the loop against a different prompt file
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the loop against .ralph/PROMPT.md
    Run(LoopArgs),

    /// Run the loop against .ralph/PROMPT_build.md
    Build(LoopArgs),

    /// Run the loop against .ralph/PROMPT_plan.md
    Plan(LoopArgs),
}

impl Command {
    /// Prompt file under `.ralph/` this command reads
    pub fn prompt_file(&self) -> &'static str {
        match self {
            Command::Run(_) => "PROMPT.md",
            Command::Build(_) => "PROMPT_build.md",
            Command::Plan(_) => "PROMPT_plan.md",
        }
    }

    pub fn args(&self) -> &LoopArgs {
        match self {
            Command::Run(args) | Command::Build(args) | Command::Plan(args) => args,
        }
    }
}

/// Flags shared by every loop command
#[derive(Debug, Clone, Default, Args)]
pub struct LoopArgs {
    /// Maximum iterations (0 = unbounded)
    #[arg(long)]
    pub max: Option<u32>,

    /// Skip the git push checkpoint after each iteration
    #[arg(long)]
    pub no_push: bool,

    /// Agent to drive: claude, codex, or rlm (env: GORALPH_AGENT)
    #[arg(long)]
    pub agent: Option<String>,

    /// Use the RLM iteration strategy (phases + REPL state)
    #[arg(long)]
    pub rlm: bool,

    /// Run verification checks after each iteration
    #[arg(long)]
    pub verify: bool,

    /// RLM recursion depth bound
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::parse_from(["ralph"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_run_with_flags() {
        let cli = Cli::parse_from(["ralph", "run", "--max", "5", "--no-push", "--verify"]);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.max, Some(5));
        assert!(args.no_push);
        assert!(args.verify);
        assert!(!args.rlm);
    }

    #[test]
    fn test_parse_agent_and_depth() {
        let cli = Cli::parse_from(["ralph", "build", "--agent", "codex", "--max-depth", "4"]);
        let Some(Command::Build(args)) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(args.agent.as_deref(), Some("codex"));
        assert_eq!(args.max_depth, Some(4));
    }

    #[test]
    fn test_prompt_file_per_command() {
        assert_eq!(Cli::parse_from(["ralph", "run"]).command.unwrap().prompt_file(), "PROMPT.md");
        assert_eq!(
            Cli::parse_from(["ralph", "build"]).command.unwrap().prompt_file(),
            "PROMPT_build.md"
        );
        assert_eq!(
            Cli::parse_from(["ralph", "plan"]).command.unwrap().prompt_file(),
            "PROMPT_plan.md"
        );
    }

    #[test]
    fn test_rlm_flag() {
        let cli = Cli::parse_from(["ralph", "run", "--rlm"]);
        assert!(cli.command.unwrap().args().rlm);
    }
}
