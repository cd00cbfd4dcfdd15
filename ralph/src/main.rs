//! Ralph - CLI entry point
//!
//! Drives a coding agent against a prompt file until it emits the
//! completion marker or the iteration bound is hit.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use ralph::cli::Cli;
use ralph::config::{FileConfig, LoopConfig};
use ralph::r#loop::LoopEngine;
use ralph::render::Renderer;
use ralph::vcs::GitVcs;
use ralph::{create_mode, create_provider};

/// Tracing goes to a file so the terminal stays clean for the renderer.
/// Level priority: --log-level flag > config file > INFO.
fn setup_logging(root: &Path, cli_level: Option<&str>, config_level: Option<&str>) -> Result<()> {
    let log_dir = root.join(".ralph").join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_level.or(config_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: unknown log-level '{other}', defaulting to INFO");
            tracing::Level::INFO
        }
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("ralph.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("Failed to get working directory")?;

    // Load the log level early, before full config resolution
    let config_level = FileConfig::load_log_level(&root);
    setup_logging(&root, cli.log_level.as_deref(), config_level.as_deref())?;

    let Some(command) = cli.command else {
        println!("ralph {}", env!("CARGO_PKG_VERSION"));
        println!("Run 'ralph --help' for usage.");
        return Ok(());
    };

    let file_config = FileConfig::load(&root)?;
    let config = LoopConfig::resolve(root, command.prompt_file(), command.args(), &file_config)?;
    info!(
        agent = %config.agent,
        mode = ?config.mode,
        max_iterations = config.max_iterations,
        prompt = %config.prompt_path.display(),
        "starting run"
    );

    let provider = create_provider(&config);
    let mode = create_mode(&config);
    let vcs = Arc::new(GitVcs::new(&config.root));
    let renderer = Renderer::stdout();

    let mut engine = LoopEngine::new(config, provider, mode, vcs, renderer);
    let summary = engine.run().await?;
    debug!(
        iterations = summary.iterations,
        completed = summary.completed,
        "run finished"
    );
    Ok(())
}
