//! Codex adapter: item-stream JSONL events over subprocess stdout
//!
//! Event shape: `turn.completed` carries per-turn usage deltas,
//! `item.started` / `item.completed` bracket tool items and deliver
//! finished `agent_message` / `reasoning` text, `turn.failed` and
//! `error` report failures.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::QUERY_TIMEOUT;
use super::error::AgentError;
use super::provider::{AgentProvider, QueryResponse, StreamReader};
use super::stream::StreamState;
use super::types::AgentOutcome;
use crate::render::Renderer;

const CODEX_BIN: &str = "codex";
const STREAM_ARGS: &[&str] = &["exec", "--json", "--skip-git-repo-check", "-"];

/// Command strings longer than this render truncated with an ellipsis
const COMMAND_DISPLAY_MAX: usize = 50;

/// Adapter for the codex CLI
pub struct CodexAgent {
    model: String,
}

impl CodexAgent {
    pub fn new() -> Self {
        Self {
            model: "gpt-5-codex".to_string(),
        }
    }
}

impl Default for CodexAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentProvider for CodexAgent {
    fn name(&self) -> &str {
        "codex"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(CODEX_BIN);
        cmd.args(STREAM_ARGS);
        cmd
    }

    async fn parse_stream(
        &self,
        stdout: StreamReader,
        log: &mut (dyn AsyncWrite + Send + Unpin),
        renderer: &Renderer,
    ) -> Result<AgentOutcome, AgentError> {
        parse_item_stream(stdout, log, renderer).await
    }

    /// One-shot query: run the same JSONL stream without rendering and
    /// keep the accumulated message text plus usage.
    async fn query(&self, prompt: &str) -> Result<QueryResponse, AgentError> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|e| AgentError::Spawn {
            provider: "codex".to_string(),
            source: e,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::InvalidResponse("no stdin pipe".to_string()))?;
        let prompt = prompt.as_bytes().to_vec();
        let run = async move {
            stdin.write_all(&prompt).await?;
            drop(stdin);
            let output = child.wait_with_output().await?;
            Ok::<_, AgentError>(output)
        };
        let output = tokio::time::timeout(QUERY_TIMEOUT, run)
            .await
            .map_err(|_| AgentError::Timeout(QUERY_TIMEOUT))??;

        let quiet = Renderer::with_sink(Box::new(std::io::sink()), false);
        let mut log = tokio::io::sink();
        let outcome = parse_item_stream(output.stdout.as_slice(), &mut log, &quiet).await?;
        if outcome.is_error {
            return Err(AgentError::InvalidResponse("codex reported an error event".to_string()));
        }
        Ok(QueryResponse {
            text: outcome.text,
            usage: outcome.usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TurnCompleted {
    #[serde(default)]
    usage: Option<CodexUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cached_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct TurnFailed {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ItemEvent {
    item: Item,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: String,
    #[serde(default)]
    item_type: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl Item {
    fn is_tool(&self) -> bool {
        matches!(
            self.item_type.as_str(),
            "command_execution" | "mcp_tool_call" | "file_change" | "web_search"
        )
    }

    fn display_name(&self) -> String {
        match self.item_type.as_str() {
            "command_execution" => command_display(self.command.as_deref().unwrap_or("")),
            "mcp_tool_call" => self.tool.clone().unwrap_or_else(|| "mcp tool".to_string()),
            "file_change" => "file change".to_string(),
            "web_search" => "web search".to_string(),
            other => other.to_string(),
        }
    }
}

fn command_display(command: &str) -> String {
    let count = command.chars().count();
    if count > COMMAND_DISPLAY_MAX {
        let truncated: String = command.chars().take(COMMAND_DISPLAY_MAX).collect();
        format!("{truncated}...")
    } else {
        command.to_string()
    }
}

/// Parse the item stream to EOF, producing the canonical outcome.
pub(crate) async fn parse_item_stream<R, W>(
    reader: R,
    log: &mut W,
    renderer: &Renderer,
) -> Result<AgentOutcome, AgentError>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin + ?Sized,
{
    let mut outcome = AgentOutcome::new("codex");
    let mut state = StreamState::new();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        log.write_all(line.as_bytes()).await?;
        log.write_all(b"\n").await?;

        let Ok(envelope) = serde_json::from_str::<Envelope>(&line) else {
            continue;
        };
        match envelope.kind.as_str() {
            "turn.completed" => match serde_json::from_str::<TurnCompleted>(&line) {
                Ok(event) => {
                    let usage = event.usage.unwrap_or_default();
                    outcome.usage.input_tokens += usage.input_tokens;
                    outcome.usage.cache_read_tokens += usage.cached_input_tokens;
                    outcome.usage.output_tokens += usage.output_tokens;
                }
                Err(e) => debug!(error = %e, "turn.completed decode failed"),
            },
            "turn.failed" => {
                outcome.is_error = true;
                if let Ok(event) = serde_json::from_str::<TurnFailed>(&line) {
                    if let Some(error) = event.error {
                        debug!(message = %error.message, "turn failed");
                    }
                }
            }
            "error" => {
                outcome.is_error = true;
                if let Ok(event) = serde_json::from_str::<ErrorBody>(&line) {
                    renderer.error(&event.message);
                }
            }
            "item.started" => match serde_json::from_str::<ItemEvent>(&line) {
                Ok(event) if event.item.is_tool() => {
                    let name = event.item.display_name();
                    if state.start_tool(&event.item.id, &name) {
                        renderer.tool_started(&event.item.id, &name);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "item.started decode failed"),
            },
            "item.completed" => match serde_json::from_str::<ItemEvent>(&line) {
                Ok(event) => handle_completed(event.item, &mut outcome, &mut state, renderer),
                Err(e) => debug!(error = %e, "item.completed decode failed"),
            },
            _ => {}
        }
    }

    outcome.text.push_str(&state.text);
    outcome.detect_markers();
    Ok(outcome)
}

fn handle_completed(item: Item, outcome: &mut AgentOutcome, state: &mut StreamState, renderer: &Renderer) {
    if item.is_tool() {
        if let Some(name) = state.complete_tool(&item.id) {
            renderer.tool_done(&item.id, &name);
        }
        return;
    }
    match item.item_type.as_str() {
        "agent_message" | "reasoning" => {
            if item.item_type == "reasoning" {
                outcome.turns += 1;
            }
            if let Some(text) = item.text {
                renderer.text(&text);
                renderer.text("\n");
                state.text.push_str(&text);
                state.text.push('\n');
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::COMPLETE_MARKER;

    async fn parse(lines: &[&str]) -> (AgentOutcome, String) {
        let input = lines.join("\n").into_bytes();
        let mut log = Vec::new();
        let (renderer, sink) = Renderer::memory();
        let outcome = parse_item_stream(input.as_slice(), &mut log, &renderer)
            .await
            .unwrap();
        (outcome, sink.contents())
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_turns() {
        let (outcome, _) = parse(&[
            r#"{"type":"turn.completed","usage":{"input_tokens":100,"cached_input_tokens":40,"output_tokens":10}}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":50,"cached_input_tokens":20,"output_tokens":5}}"#,
        ])
        .await;
        assert_eq!(outcome.usage.input_tokens, 150);
        assert_eq!(outcome.usage.cache_read_tokens, 60);
        assert_eq!(outcome.usage.output_tokens, 15);
    }

    #[tokio::test]
    async fn test_command_item_truncated_display() {
        let long = "x".repeat(60);
        let line = format!(
            r#"{{"type":"item.started","item":{{"id":"i1","item_type":"command_execution","command":"{long}"}}}}"#
        );
        let (_, rendered) = parse(&[line.as_str()]).await;
        assert!(rendered.contains(&format!("{}...", "x".repeat(50))));
        assert!(!rendered.contains(&"x".repeat(51)));
    }

    #[tokio::test]
    async fn test_tool_item_pairing() {
        let (_, rendered) = parse(&[
            r#"{"type":"item.started","item":{"id":"i1","item_type":"mcp_tool_call","tool":"search_docs"}}"#,
            r#"{"type":"item.completed","item":{"id":"i1","item_type":"mcp_tool_call","tool":"search_docs"}}"#,
        ])
        .await;
        assert!(rendered.contains("→ search_docs"));
        assert!(rendered.contains("✓ search_docs"));
    }

    #[tokio::test]
    async fn test_messages_append_and_reasoning_counts_turns() {
        let (outcome, rendered) = parse(&[
            r#"{"type":"item.completed","item":{"id":"i1","item_type":"reasoning","text":"thinking"}}"#,
            r#"{"type":"item.completed","item":{"id":"i2","item_type":"agent_message","text":"hello"}}"#,
            r#"{"type":"item.completed","item":{"id":"i3","item_type":"reasoning","text":"more"}}"#,
        ])
        .await;
        assert_eq!(outcome.turns, 2);
        assert!(rendered.contains("thinking"));
        assert!(rendered.contains("hello"));
        assert_eq!(outcome.text, "thinking\nhello\nmore\n");
    }

    #[tokio::test]
    async fn test_error_event_renders_and_flags() {
        let (outcome, rendered) = parse(&[
            r#"{"type":"error","message":"stream exploded"}"#,
        ])
        .await;
        assert!(outcome.is_error);
        assert!(rendered.contains("stream exploded"));
    }

    #[tokio::test]
    async fn test_turn_failed_flags_without_render() {
        let (outcome, rendered) = parse(&[
            r#"{"type":"turn.failed","error":{"message":"quota"}}"#,
        ])
        .await;
        assert!(outcome.is_error);
        assert!(!rendered.contains("quota"));
    }

    #[tokio::test]
    async fn test_completion_marker_in_agent_message() {
        let line = format!(
            r#"{{"type":"item.completed","item":{{"id":"i1","item_type":"agent_message","text":"done {COMPLETE_MARKER}"}}}}"#
        );
        let (outcome, _) = parse(&[line.as_str()]).await;
        assert!(outcome.session_complete);
    }

    #[tokio::test]
    async fn test_fixed_names_for_file_change_and_web_search() {
        let (_, rendered) = parse(&[
            r#"{"type":"item.started","item":{"id":"i1","item_type":"file_change"}}"#,
            r#"{"type":"item.started","item":{"id":"i2","item_type":"web_search"}}"#,
        ])
        .await;
        assert!(rendered.contains("→ file change"));
        assert!(rendered.contains("→ web search"));
    }
}
