use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};

use rlmcore::cli::{Cli, Command, StateCommand};
use rlmcore::{EngineConfig, FsSandbox, ReplEnv, ScriptEngine, StateStore};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Exec {
            script,
            context,
            query,
            root,
            timeout,
        } => {
            let code = std::fs::read_to_string(&script)
                .context(format!("Failed to read script {}", script.display()))?;
            let context_text = match context {
                Some(path) => std::fs::read_to_string(&path)
                    .context(format!("Failed to read context {}", path.display()))?,
                None => String::new(),
            };
            let root = match root {
                Some(r) => r,
                None => std::env::current_dir()?,
            };

            let engine = ScriptEngine::new(EngineConfig {
                timeout: Duration::from_secs(timeout),
                ..EngineConfig::default()
            });
            let mut env = ReplEnv::new(context_text, query, FsSandbox::new(root), None);
            let outcome = engine.execute(&code, &mut env);

            print!("{}", outcome.output);
            if outcome.truncated {
                println!("{}", "... [output truncated]".yellow());
            }
            if let Some(err) = outcome.error {
                eprintln!("{} {}", "error:".red(), err);
                std::process::exit(1);
            }
            let vars = env.var_names();
            if !vars.is_empty() {
                println!("{} {}", "vars:".dimmed(), vars.join(", "));
            }
        }
        Command::State { command } => match command {
            StateCommand::Init { dir } => {
                let store = StateStore::new(&dir);
                let session = store.initialize()?;
                println!("{} Initialized state at {} (session {})", "✓".green(), dir.display(), session.session_id.cyan());
            }
            StateCommand::Show { dir } => {
                let store = StateStore::new(&dir);
                let session = store.read_session()?;
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            StateCommand::History { dir } => {
                let store = StateStore::new(&dir);
                for entry in store.read_history()? {
                    println!("{}", serde_json::to_string(&entry)?);
                }
            }
        },
    }

    Ok(())
}
