//! Script execution: a rhai engine with a deadline and an output cap
//!
//! Each execution builds a fresh `rhai::Engine` wired to the
//! environment's bindings, runs the code against a scope seeded from
//! the persisted variable map, then harvests top-level variables back
//! into the map so they survive to the next execution within the same
//! iteration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Scope};
use tracing::debug;

use crate::bridge::Bridge;
use crate::error::RlmError;
use crate::fsops::{FsSandbox, TreeNode};
use crate::retools::RegexTools;
use crate::{DEFAULT_OUTPUT_CAP, DEFAULT_SCRIPT_TIMEOUT};

/// Execution limits for one script run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock deadline the interpreter honors via progress callbacks
    pub timeout: Duration,
    /// Output characters kept before the surplus is discarded
    pub max_output_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCRIPT_TIMEOUT,
            max_output_chars: DEFAULT_OUTPUT_CAP,
        }
    }
}

/// Result of one script execution
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub output: String,
    pub truncated: bool,
    pub error: Option<String>,
}

/// Bindings visible to scripts, persisted across executions within an
/// iteration.
///
/// `context` and `query` are re-bound fresh every execution; everything
/// else the script defines at top level is harvested into `vars` and
/// pushed back next time.
pub struct ReplEnv {
    pub context: String,
    pub query: String,
    vars: HashMap<String, Dynamic>,
    fs: FsSandbox,
    re: RegexTools,
    bridge: Option<Arc<Bridge>>,
}

/// Binding names that are never harvested into the variable map
const RESERVED: &[&str] = &["context", "query", "fs", "re"];

impl ReplEnv {
    pub fn new(context: String, query: String, fs: FsSandbox, bridge: Option<Arc<Bridge>>) -> Self {
        Self {
            context,
            query,
            vars: HashMap::new(),
            fs,
            re: RegexTools,
            bridge,
        }
    }

    /// Stringified value of a harvested variable, for `FINAL_VAR`
    pub fn var_string(&self, name: &str) -> Option<String> {
        self.vars.get(name).map(|v| v.to_string())
    }

    pub fn var_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Default)]
struct OutBuf {
    text: String,
    cap: usize,
    truncated: bool,
}

impl OutBuf {
    fn push_line(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        let remaining = self.cap.saturating_sub(self.text.len());
        let with_newline = format!("{line}\n");
        if with_newline.len() > remaining {
            let mut cut = remaining;
            while cut > 0 && !with_newline.is_char_boundary(cut) {
                cut -= 1;
            }
            self.text.push_str(&with_newline[..cut]);
            self.truncated = true;
        } else {
            self.text.push_str(&with_newline);
        }
    }
}

/// Script runner with fixed limits; cheap to construct, reusable
#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    config: EngineConfig,
}

impl ScriptEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Execute `code` against the environment, honoring the deadline
    /// and the output cap. Never panics; failures land in
    /// [`ExecOutcome::error`].
    pub fn execute(&self, code: &str, env: &mut ReplEnv) -> ExecOutcome {
        let buffer = Arc::new(Mutex::new(OutBuf {
            cap: self.config.max_output_chars,
            ..OutBuf::default()
        }));

        let engine = self.build_engine(env, buffer.clone());
        let mut scope = Scope::new();
        scope.push("context", env.context.clone());
        scope.push("query", env.query.clone());
        scope.push("re", env.re);
        scope.push("fs", env.fs.clone());
        for (name, value) in &env.vars {
            scope.push_dynamic(name.as_str(), value.clone());
        }

        let result = engine.run_with_scope(&mut scope, code);

        // Harvest top-level variables for the next execution
        for (name, constant, value) in scope.iter() {
            if constant || RESERVED.contains(&name) {
                continue;
            }
            env.vars.insert(name.to_string(), value);
        }

        let buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
        let error = match result {
            Ok(()) => None,
            Err(e) => match *e {
                EvalAltResult::ErrorTerminated(..) => Some(RlmError::Timeout.to_string()),
                other => Some(other.to_string()),
            },
        };
        debug!(
            output_len = buf.text.len(),
            truncated = buf.truncated,
            error = ?error,
            "script execution finished"
        );

        ExecOutcome {
            output: buf.text.clone(),
            truncated: buf.truncated,
            error,
        }
    }

    fn build_engine(&self, env: &ReplEnv, buffer: Arc<Mutex<OutBuf>>) -> Engine {
        let mut engine = Engine::new();

        // Deadline enforcement: the progress hook fires on every
        // operation, so a runaway loop is interrupted promptly.
        let deadline = self.config.timeout;
        let started = Instant::now();
        engine.on_progress(move |_ops| {
            if started.elapsed() >= deadline {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        // print / println both land in the capped output buffer
        let print_buf = buffer.clone();
        engine.on_print(move |line| {
            let mut buf = print_buf.lock().unwrap_or_else(|e| e.into_inner());
            buf.push_line(line);
        });
        let println_buf = buffer.clone();
        engine.register_fn("println", move |value: Dynamic| {
            let mut buf = println_buf.lock().unwrap_or_else(|e| e.into_inner());
            buf.push_line(&value.to_string());
        });
        let println_empty_buf = buffer;
        engine.register_fn("println", move || {
            let mut buf = println_empty_buf.lock().unwrap_or_else(|e| e.into_inner());
            buf.push_line("");
        });

        Self::register_regex(&mut engine);
        Self::register_fs(&mut engine);
        self.register_llm(&mut engine, env.bridge.clone());

        engine
    }

    fn register_regex(engine: &mut Engine) {
        engine.register_type_with_name::<RegexTools>("Re");
        engine.register_fn("findAll", |re: &mut RegexTools, p: &str, t: &str| {
            re.find_all(p, t).map(to_string_array).map_err(script_err)
        });
        engine.register_fn("find_all", |re: &mut RegexTools, p: &str, t: &str| {
            re.find_all(p, t).map(to_string_array).map_err(script_err)
        });
        engine.register_fn("search", |re: &mut RegexTools, p: &str, t: &str| {
            re.search(p, t).map_err(script_err)
        });
        engine.register_fn("split", |re: &mut RegexTools, p: &str, t: &str, n: i64| {
            re.split(p, t, n).map(to_string_array).map_err(script_err)
        });
        engine.register_fn("replace", |re: &mut RegexTools, p: &str, t: &str, r: &str| {
            re.replace(p, t, r).map_err(script_err)
        });
    }

    fn register_fs(engine: &mut Engine) {
        engine.register_type_with_name::<FsSandbox>("Fs");
        engine.register_fn("list", |fs: &mut FsSandbox, path: &str| {
            fs.list(path)
                .map(|entries| {
                    entries
                        .into_iter()
                        .map(|e| {
                            let mut map = Map::new();
                            map.insert("name".into(), Dynamic::from(e.name));
                            map.insert("isDir".into(), Dynamic::from(e.is_dir));
                            map.insert("size".into(), Dynamic::from(e.size as i64));
                            Dynamic::from(map)
                        })
                        .collect::<Array>()
                })
                .map_err(script_err)
        });
        engine.register_fn("read", |fs: &mut FsSandbox, path: &str| {
            fs.read(path).map_err(script_err)
        });
        engine.register_fn("glob", |fs: &mut FsSandbox, pattern: &str| {
            fs.glob(pattern).map(to_string_array).map_err(script_err)
        });
        engine.register_fn("exists", |fs: &mut FsSandbox, path: &str| fs.exists(path));
        engine.register_fn("tree", |fs: &mut FsSandbox, path: &str, depth: i64| {
            fs.tree(path, depth.max(0) as usize)
                .map(|node| Dynamic::from(tree_to_map(node)))
                .map_err(script_err)
        });
    }

    fn register_llm(&self, engine: &mut Engine, bridge: Option<Arc<Bridge>>) {
        let Some(bridge) = bridge else {
            // No bridge wired in (offline execution): every variant
            // reports the same budget-exhausted string.
            let stub = |_q: &str| RlmError::DepthExceeded(0).to_string();
            engine.register_fn("recursiveLLM", move |q: &str, _c: &str| stub(q));
            engine.register_fn("recursive_llm", move |q: &str, _c: &str| stub(q));
            engine.register_fn("llm_query", move |q: &str| stub(q));
            engine.register_fn("llm_batch", move |_prompts: Array| -> Result<Array, Box<EvalAltResult>> {
                Err(RlmError::DepthExceeded(0).to_string().into())
            });
            return;
        };

        let b = bridge.clone();
        engine.register_fn(
            "recursiveLLM",
            move |query: &str, context: &str| -> Result<String, Box<EvalAltResult>> {
                sub_request(&b, &compose_sub_prompt(query, context))
            },
        );
        let b = bridge.clone();
        engine.register_fn(
            "recursive_llm",
            move |query: &str, context: &str| -> Result<String, Box<EvalAltResult>> {
                sub_request(&b, &compose_sub_prompt(query, context))
            },
        );
        let b = bridge.clone();
        engine.register_fn(
            "llm_query",
            move |prompt: &str| -> Result<String, Box<EvalAltResult>> { sub_request(&b, prompt) },
        );
        let b = bridge;
        engine.register_fn(
            "llm_batch",
            move |prompts: Array| -> Result<Array, Box<EvalAltResult>> {
                let prompts: Vec<String> = prompts.into_iter().map(|p| p.to_string()).collect();
                b.handle_batch(&prompts)
                    .map(to_string_array)
                    .map_err(script_err)
            },
        );
    }
}

/// Depth exhaustion comes back as a plain string so the script can
/// inspect it and move on; every other failure is a script error.
fn sub_request(bridge: &Bridge, prompt: &str) -> Result<String, Box<EvalAltResult>> {
    match bridge.handle_request(prompt) {
        Ok(text) => Ok(text),
        Err(e @ RlmError::DepthExceeded(_)) => Ok(e.to_string()),
        Err(e) => Err(e.to_string().into()),
    }
}

fn compose_sub_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        query.to_string()
    } else {
        format!("Context:\n{context}\n\nQuestion: {query}\n\nAnswer using only the context above.")
    }
}

fn script_err(e: RlmError) -> Box<EvalAltResult> {
    e.to_string().into()
}

fn to_string_array(items: Vec<String>) -> Array {
    items.into_iter().map(Dynamic::from).collect()
}

fn tree_to_map(node: TreeNode) -> Map {
    let mut map = Map::new();
    map.insert("name".into(), Dynamic::from(node.name));
    map.insert("isDir".into(), Dynamic::from(node.is_dir));
    map.insert(
        "children".into(),
        Dynamic::from(
            node.children
                .into_iter()
                .map(|c| Dynamic::from(tree_to_map(c)))
                .collect::<Array>(),
        ),
    );
    map
}
