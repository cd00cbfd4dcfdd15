//! CLI argument parsing for the rlm debug binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rlm")]
#[command(author, version, about = "Offline runner for RLM REPL scripts and session state", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a script file with the sandbox bindings (recursion disabled)
    Exec {
        /// Script file to run
        #[arg(required = true)]
        script: PathBuf,

        /// File whose contents become the `context` binding
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Value of the `query` binding
        #[arg(short, long, default_value = "")]
        query: String,

        /// Working root for the `fs` bindings (default: current dir)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Script deadline in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Manage a `.ralph/state` directory
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Wipe and recreate the state directory with a fresh session
    Init {
        /// State directory
        #[arg(default_value = ".ralph/state")]
        dir: PathBuf,
    },

    /// Print the current session state
    Show {
        /// State directory
        #[arg(default_value = ".ralph/state")]
        dir: PathBuf,
    },

    /// Print the history journal
    History {
        /// State directory
        #[arg(default_value = ".ralph/state")]
        dir: PathBuf,
    },
}
