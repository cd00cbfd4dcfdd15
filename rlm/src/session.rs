//! REPL session driver: the turn loop between model and interpreter
//!
//! Each turn serializes the transcript into a single one-shot prompt
//! (the sub-LLM client keeps no conversation state), executes whatever
//! code the response carries, then scans the response for an answer
//! marker. Script output feeds back as the next user message.

use std::sync::Arc;

use tracing::{debug, info};

use crate::answer::{Answer, detect_answer, extract_code};
use crate::bridge::{Bridge, CallUsage, LlmCall, SubQuery};
use crate::engine::{EngineConfig, ReplEnv, ScriptEngine};
use crate::error::RlmResult;
use crate::fsops::FsSandbox;

/// Limits for one REPL session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model turns before the session gives up without an answer
    pub max_turns: usize,
    /// Recursion budget shared by recursiveLLM / llm_query / llm_batch
    pub max_depth: usize,
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            max_depth: 3,
            engine: EngineConfig::default(),
        }
    }
}

/// What a session produced
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// The FINAL / FINAL_VAR answer, when one was detected
    pub answer: Option<String>,
    /// Accumulated assistant text across all turns
    pub text: String,
    /// Model turns consumed
    pub turns: u32,
    /// Token totals: driver turns plus bridge sub-calls
    pub usage: CallUsage,
    /// Sub-LLM call history from the bridge
    pub calls: Vec<LlmCall>,
}

/// Live events for rendering while the session runs
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent<'a> {
    Assistant(&'a str),
    ScriptOutput(&'a str),
}

/// Drives the model/interpreter loop against a [`SubQuery`] client
pub struct ReplSession {
    client: Arc<dyn SubQuery>,
    fs: FsSandbox,
    config: SessionConfig,
}

impl ReplSession {
    pub fn new(client: Arc<dyn SubQuery>, fs: FsSandbox, config: SessionConfig) -> Self {
        Self { client, fs, config }
    }

    /// Run the session to an answer or the turn budget
    pub fn run(
        &self,
        query: &str,
        context: &str,
        mut observer: impl FnMut(SessionEvent<'_>),
    ) -> RlmResult<SessionResult> {
        let bridge = Bridge::new(self.client.clone(), self.config.max_depth);
        let engine = ScriptEngine::new(self.config.engine.clone());
        let mut env = ReplEnv::new(context.to_string(), query.to_string(), self.fs.clone(), Some(bridge.clone()));

        let system = system_prompt(context.len(), self.config.max_depth);
        let mut exchanges: Vec<(String, String)> = Vec::new();
        let mut text = String::new();
        let mut usage = CallUsage::default();
        let mut turns = 0u32;

        for turn in 1..=self.config.max_turns {
            let prompt = render_conversation(&system, query, &exchanges);
            debug!(turn, prompt_len = prompt.len(), "session: querying model");
            let reply = self.client.query(&prompt)?;
            turns += 1;
            usage.input_tokens += reply.input_tokens;
            usage.output_tokens += reply.output_tokens;

            observer(SessionEvent::Assistant(&reply.text));
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&reply.text);

            // Execute before scanning: FINAL_VAR may name a variable
            // this very response just defined.
            let mut feedback = String::new();
            for code in extract_code(&reply.text) {
                let outcome = engine.execute(&code, &mut env);
                feedback.push_str(&outcome.output);
                if outcome.truncated {
                    feedback.push_str("... [output truncated]\n");
                }
                if let Some(err) = outcome.error {
                    feedback.push_str(&format!("Error: {err}\n"));
                }
            }

            match detect_answer(&reply.text) {
                Some(Answer::Text(answer)) => {
                    info!(turn, "session: inline answer detected");
                    return Ok(self.finish(Some(answer), text, turns, usage, &bridge));
                }
                Some(Answer::Var(name)) => match env.var_string(&name) {
                    Some(value) => {
                        info!(turn, var = %name, "session: variable answer detected");
                        return Ok(self.finish(Some(value), text, turns, usage, &bridge));
                    }
                    None => {
                        feedback.push_str(&format!("Error: FINAL_VAR({name}) names an undefined variable\n"));
                    }
                },
                None => {}
            }

            if feedback.is_empty() {
                feedback.push_str("(no output)\n");
            }
            observer(SessionEvent::ScriptOutput(&feedback));
            exchanges.push((reply.text, feedback));
        }

        info!(turns, "session: turn budget spent without an answer");
        Ok(self.finish(None, text, turns, usage, &bridge))
    }

    fn finish(
        &self,
        answer: Option<String>,
        text: String,
        turns: u32,
        mut usage: CallUsage,
        bridge: &Bridge,
    ) -> SessionResult {
        let sub_usage = bridge.usage();
        usage.input_tokens += sub_usage.input_tokens;
        usage.output_tokens += sub_usage.output_tokens;
        SessionResult {
            answer,
            text,
            turns,
            usage,
            calls: bridge.history(),
        }
    }
}

fn system_prompt(context_len: usize, max_depth: usize) -> String {
    format!(
        r#"You operate a rhai REPL over a context you cannot see directly. Size: {context_len} characters.

Bindings:
- context: string (the material to analyze)
- query: string (the task)
- re.findAll(pattern, text) / re.search(pattern, text) / re.split(pattern, text, n) / re.replace(pattern, text, repl)
- fs.list(path) / fs.read(path) / fs.glob(pattern) / fs.exists(path) / fs.tree(path, depth)
- recursiveLLM(sub_query, sub_context) -> string (depth budget: {max_depth})
- llm_query(prompt) -> string, llm_batch(prompts) -> array
- print(value) / println(value)

Rules:
- Emit code in ```repl fenced blocks. Top-level variables persist between your turns.
- Inspect the context with code before answering; never guess.
- Finish with FINAL("answer") or FINAL_VAR(variable_name)."#
    )
}

fn render_conversation(system: &str, query: &str, exchanges: &[(String, String)]) -> String {
    let mut prompt = format!("{system}\n\nTask: {query}\n");
    for (assistant, output) in exchanges {
        prompt.push_str("\n[assistant]\n");
        prompt.push_str(assistant);
        prompt.push_str("\n\n[execution output]\n");
        prompt.push_str(output);
    }
    if !exchanges.is_empty() {
        prompt.push_str("\nContinue, or finish with FINAL(\"...\").\n");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::QueryReply;
    use crate::error::RlmResult;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Client returning a fixed sequence of responses
    struct Scripted {
        replies: Mutex<Vec<&'static str>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<&'static str>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    impl SubQuery for Scripted {
        fn query(&self, _prompt: &str) -> RlmResult<QueryReply> {
            let text = self.replies.lock().unwrap().pop().unwrap_or("FINAL(\"out of replies\")");
            Ok(QueryReply {
                text: text.to_string(),
                input_tokens: 100,
                output_tokens: 20,
            })
        }
    }

    fn session(client: Arc<dyn SubQuery>, temp: &TempDir, config: SessionConfig) -> ReplSession {
        ReplSession::new(client, FsSandbox::new(temp.path()), config)
    }

    #[test]
    fn test_inline_final_on_first_turn() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![r#"No code needed. FINAL("direct answer")"#]);
        let result = session(client, &temp, SessionConfig::default())
            .run("q", "ctx", |_| {})
            .unwrap();
        assert_eq!(result.answer.as_deref(), Some("direct answer"));
        assert_eq!(result.turns, 1);
        assert_eq!(result.usage.input_tokens, 100);
    }

    #[test]
    fn test_final_var_resolves_from_same_response() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![
            "```repl\nlet summary = \"found \" + re.findAll(\"[0-9]+\", context).len().to_string() + \" numbers\";\n```\nFINAL_VAR(summary)",
        ]);
        let result = session(client, &temp, SessionConfig::default())
            .run("count numbers", "a1 b2 c3", |_| {})
            .unwrap();
        assert_eq!(result.answer.as_deref(), Some("found 3 numbers"));
    }

    #[test]
    fn test_final_var_undefined_is_not_an_answer() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![
            "FINAL_VAR(ghost)",
            r#"FINAL("recovered")"#,
        ]);
        let mut feedback_seen = String::new();
        let result = session(client, &temp, SessionConfig::default())
            .run("q", "", |event| {
                if let SessionEvent::ScriptOutput(out) = event {
                    feedback_seen.push_str(out);
                }
            })
            .unwrap();
        assert_eq!(result.answer.as_deref(), Some("recovered"));
        assert_eq!(result.turns, 2);
        assert!(feedback_seen.contains("undefined variable"));
    }

    #[test]
    fn test_script_error_surfaces_in_feedback() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![
            "```repl\nfs.read(\"missing.txt\");\n```",
            r#"FINAL("done")"#,
        ]);
        let mut feedback_seen = String::new();
        session(client, &temp, SessionConfig::default())
            .run("q", "", |event| {
                if let SessionEvent::ScriptOutput(out) = event {
                    feedback_seen.push_str(out);
                }
            })
            .unwrap();
        assert!(feedback_seen.contains("Error:"));
        assert!(feedback_seen.contains("no such file"));
    }

    #[test]
    fn test_timeout_reported_to_model() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![
            "```repl\nloop { }\n```",
            r#"FINAL("gave up on the loop")"#,
        ]);
        let config = SessionConfig {
            engine: EngineConfig {
                timeout: Duration::from_millis(100),
                ..EngineConfig::default()
            },
            ..SessionConfig::default()
        };
        let mut feedback_seen = String::new();
        let result = session(client, &temp, config)
            .run("q", "", |event| {
                if let SessionEvent::ScriptOutput(out) = event {
                    feedback_seen.push_str(out);
                }
            })
            .unwrap();
        assert!(feedback_seen.contains("Error: execution timed out"));
        assert_eq!(result.answer.as_deref(), Some("gave up on the loop"));
    }

    #[test]
    fn test_turn_budget_exhausted() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![
            "```repl\nprint(1);\n```",
            "```repl\nprint(2);\n```",
        ]);
        let config = SessionConfig {
            max_turns: 2,
            ..SessionConfig::default()
        };
        let result = session(client, &temp, config).run("q", "", |_| {}).unwrap();
        assert_eq!(result.answer, None);
        assert_eq!(result.turns, 2);
    }

    #[test]
    fn test_variables_persist_between_turns() {
        let temp = TempDir::new().unwrap();
        let client = Scripted::new(vec![
            "```repl\nlet acc = 40;\n```",
            "```repl\nacc += 2;\n```\nFINAL_VAR(acc)",
        ]);
        let result = session(client, &temp, SessionConfig::default())
            .run("q", "", |_| {})
            .unwrap();
        assert_eq!(result.answer.as_deref(), Some("42"));
    }
}
