//! Filesystem state store for RLM sessions
//!
//! # Layout
//!
//! ```text
//! .ralph/state/
//! ├── session.json       # session state, rewritten atomically
//! ├── context.json       # context manifest, read-merge-write
//! ├── history.jsonl      # append-only journal
//! ├── search/            # one JSON file per record
//! ├── narrow/
//! ├── results/
//! └── verification/      # kind_NNNN_millis.json, lexicographic = chronological
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RlmError, RlmResult};

/// Coarse state the RLM mode ascribes to each iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Plan,
    Search,
    Narrow,
    Act,
    Verify,
}

impl Phase {
    /// Display form used in prompts and banners
    pub fn name(self) -> &'static str {
        match self {
            Phase::Plan => "PLAN",
            Phase::Search => "SEARCH",
            Phase::Narrow => "NARROW",
            Phase::Act => "ACT",
            Phase::Verify => "VERIFY",
        }
    }

    /// Successor in the phase cycle; a finished VERIFY restarts at SEARCH
    pub fn next(self) -> Self {
        match self {
            Phase::Plan => Phase::Search,
            Phase::Search => Phase::Narrow,
            Phase::Narrow => Phase::Act,
            Phase::Act => Phase::Verify,
            Phase::Verify => Phase::Search,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PLAN" => Some(Phase::Plan),
            "SEARCH" => Some(Phase::Search),
            "NARROW" => Some(Phase::Narrow),
            "ACT" => Some(Phase::Act),
            "VERIFY" => Some(Phase::Verify),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-session state, rewritten on every update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub iteration: u32,
    pub depth: usize,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    fn fresh() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::now_v7().to_string(),
            iteration: 0,
            depth: 0,
            phase: Phase::Plan,
            started_at: now,
            updated_at: now,
        }
    }
}

/// One tagged discovery recorded in the context manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discovery {
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub phase: Phase,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub relevance: f32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodebaseInfo {
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub build_system: String,
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FocusSet {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
}

/// Accumulated knowledge the model maintains between iterations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextManifest {
    #[serde(default)]
    pub task: TaskInfo,
    #[serde(default)]
    pub codebase: CodebaseInfo,
    #[serde(default)]
    pub discoveries: Vec<Discovery>,
    #[serde(default)]
    pub focus: FocusSet,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One line of the append-only history journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub phase: Phase,
    pub session_complete: bool,
    pub verified: bool,
    pub error: bool,
    pub timestamp: DateTime<Utc>,
}

/// One verification check inside a stored report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCheckRecord {
    pub name: String,
    pub command: String,
    pub passed: bool,
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Stored verification report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRecord {
    pub iteration: u32,
    pub passed: bool,
    pub checks: Vec<VerifyCheckRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Kinds of per-record directories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Search,
    Narrow,
    Results,
    Verification,
}

impl RecordKind {
    fn dir(self) -> &'static str {
        match self {
            RecordKind::Search => "search",
            RecordKind::Narrow => "narrow",
            RecordKind::Results => "results",
            RecordKind::Verification => "verification",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            RecordKind::Search => "search",
            RecordKind::Narrow => "narrow",
            RecordKind::Results => "result",
            RecordKind::Verification => "verification",
        }
    }
}

const RECORD_DIRS: &[RecordKind] = &[
    RecordKind::Search,
    RecordKind::Narrow,
    RecordKind::Results,
    RecordKind::Verification,
];

/// Filesystem store rooted at `.ralph/state/`.
///
/// Not concurrency-safe across processes beyond an advisory lock taken
/// for the duration of each write.
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("context.json")
    }

    fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    /// Advisory lock held while a write is in flight; released on drop
    fn lock(&self) -> RlmResult<fs::File> {
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(".lock"))?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Wipe and recreate the state directory with a fresh session
    pub fn initialize(&self) -> RlmResult<SessionState> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        for kind in RECORD_DIRS {
            fs::create_dir_all(self.root.join(kind.dir()))?;
        }
        let session = SessionState::fresh();
        self.write_session(&session)?;
        self.write_manifest(&ContextManifest::default())?;
        info!(session_id = %session.session_id, "state store initialized");
        Ok(session)
    }

    pub fn read_session(&self) -> RlmResult<SessionState> {
        read_json(&self.session_path())
    }

    /// Atomic replace: write a sibling temp file, then rename over
    pub fn write_session(&self, session: &SessionState) -> RlmResult<()> {
        let _lock = self.lock()?;
        let mut updated = session.clone();
        updated.updated_at = Utc::now();
        let tmp = self.root.join("session.json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&updated)?)?;
        fs::rename(&tmp, self.session_path())?;
        Ok(())
    }

    pub fn read_manifest(&self) -> RlmResult<ContextManifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(ContextManifest::default());
        }
        read_json(&path)
    }

    /// Raw manifest text, for binding into the script context
    pub fn manifest_text(&self) -> RlmResult<String> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(path)?)
    }

    pub fn write_manifest(&self, manifest: &ContextManifest) -> RlmResult<()> {
        let _lock = self.lock()?;
        let mut updated = manifest.clone();
        updated.updated_at = Some(Utc::now());
        let tmp = self.root.join("context.json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&updated)?)?;
        fs::rename(&tmp, self.manifest_path())?;
        Ok(())
    }

    pub fn append_history(&self, entry: &HistoryEntry) -> RlmResult<()> {
        let _lock = self.lock()?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(())
    }

    pub fn read_history(&self) -> RlmResult<Vec<HistoryEntry>> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for line in fs::read_to_string(path)?.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Write one record file; timestamps make lexicographic order
    /// chronological.
    pub fn write_record<T: Serialize>(&self, kind: RecordKind, iteration: u32, record: &T) -> RlmResult<PathBuf> {
        let _lock = self.lock()?;
        let name = format!(
            "{}_{iteration:04}_{}.json",
            kind.prefix(),
            Utc::now().timestamp_millis()
        );
        let path = self.root.join(kind.dir()).join(name);
        fs::write(&path, serde_json::to_vec_pretty(record)?)?;
        debug!(?path, "state record written");
        Ok(path)
    }

    pub fn write_verification(&self, record: &VerifyRecord) -> RlmResult<PathBuf> {
        self.write_record(RecordKind::Verification, record.iteration, record)
    }

    /// The lexicographically greatest file in `verification/`
    pub fn latest_verification(&self) -> RlmResult<Option<VerifyRecord>> {
        let dir = self.root.join(RecordKind::Verification.dir());
        if !dir.exists() {
            return Ok(None);
        }
        let mut names: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "json").unwrap_or(false))
            .collect();
        names.sort();
        match names.last() {
            Some(path) => Ok(Some(read_json(path)?)),
            None => Ok(None),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> RlmResult<T> {
    let content =
        fs::read_to_string(path).map_err(|e| RlmError::Store(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content).map_err(|e| RlmError::Store(format!("{}: {e}", path.display())))
}
