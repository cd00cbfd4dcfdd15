//! RLM core - recursive language model REPL
//!
//! Embeds a sandboxed rhai interpreter that a language model drives by
//! emitting fenced code blocks between turns. The script environment
//! exposes the task context, regex and filesystem helpers, and a
//! depth-limited recursive sub-LLM primitive. The model signals its
//! answer with `FINAL("...")` or `FINAL_VAR(name)` markers.
//!
//! # Architecture
//!
//! ```text
//! ReplSession (turn loop over a SubQuery client)
//! ├── answer      FINAL / FINAL_VAR detection, code block extraction
//! ├── engine      rhai execution with deadline + output cap
//! │   ├── fsops   sandboxed list/read/glob/exists/tree
//! │   └── retools findAll/search/split/replace
//! ├── bridge      depth-limited recursion, call history, usage
//! └── store       .ralph/state/ session, manifest, history, records
//! ```

use std::time::Duration;

pub mod answer;
pub mod bridge;
pub mod cli;
pub mod engine;
pub mod error;
pub mod fsops;
pub mod retools;
pub mod session;
pub mod store;

pub use answer::{Answer, detect_answer, extract_code};
pub use bridge::{Bridge, CallUsage, LlmCall, QueryReply, SubQuery};
pub use engine::{EngineConfig, ExecOutcome, ReplEnv, ScriptEngine};
pub use error::{RlmError, RlmResult};
pub use fsops::{FsEntry, FsSandbox};
pub use retools::RegexTools;
pub use session::{ReplSession, SessionConfig, SessionResult};
pub use store::{
    ContextManifest, Discovery, HistoryEntry, Phase, RecordKind, SessionState, StateStore, VerifyCheckRecord,
    VerifyRecord,
};

/// Script output is clipped at this many characters
pub const DEFAULT_OUTPUT_CAP: usize = 2000;

/// Wall-clock deadline for a single script execution
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// `fs.read` truncates file contents at this many bytes
pub const DEFAULT_READ_CAP: usize = 1024 * 1024;

/// Directories hidden from `fs` listings and glob results
pub const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", ".venv", "vendor", ".ralph"];
