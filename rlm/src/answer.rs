//! Answer markers and code block extraction
//!
//! The model signals completion with `FINAL("...")` (inline answer) or
//! `FINAL_VAR(name)` (answer held in a script variable). Code reaches
//! the interpreter through fenced blocks; `repl`-tagged fences win over
//! untagged ones, and a fence-free message is executed whole.

use std::sync::LazyLock;

use regex::Regex;

/// A detected answer marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Inline answer text from `FINAL(...)`, already trimmed
    Text(String),
    /// Variable name from `FINAL_VAR(name)`, to be resolved by the caller
    Var(String),
}

// Quoting variants tried in order; triple quotes must come before the
// single-character forms or they would match with quote residue.
static FINAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#"(?s)FINAL\(\s*"""(.*?)"""\s*\)"#).unwrap(),
        Regex::new(r"(?s)FINAL\(\s*'''(.*?)'''\s*\)").unwrap(),
        Regex::new(r#"(?s)FINAL\(\s*"(.*?)"\s*\)"#).unwrap(),
        Regex::new(r"(?s)FINAL\(\s*'(.*?)'\s*\)").unwrap(),
        Regex::new(r"(?s)FINAL\(\s*`(.*?)`\s*\)").unwrap(),
    ]
});

static FINAL_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FINAL_VAR\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)").unwrap());

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```([^\n`]*)\n(.*?)```").unwrap());

/// Scan a model response for an answer marker. `FINAL` wins over
/// `FINAL_VAR` when both appear.
pub fn detect_answer(response: &str) -> Option<Answer> {
    for pattern in FINAL_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(response) {
            return Some(Answer::Text(caps[1].trim().to_string()));
        }
    }
    FINAL_VAR
        .captures(response)
        .map(|caps| Answer::Var(caps[1].to_string()))
}

fn is_repl_tag(tag: &str) -> bool {
    matches!(tag, "repl" | "rhai" | "python")
}

/// Extract the code the model wants executed.
///
/// Preference order: every `repl`-tagged fence in document order, then
/// the first untagged fence, then the whole message.
pub fn extract_code(response: &str) -> Vec<String> {
    let mut tagged = Vec::new();
    let mut untagged = None;

    for caps in FENCE.captures_iter(response) {
        let tag = caps[1].trim().to_lowercase();
        let code = caps[2].trim().to_string();
        if is_repl_tag(&tag) {
            tagged.push(code);
        } else if tag.is_empty() && untagged.is_none() {
            untagged = Some(code);
        }
    }

    if !tagged.is_empty() {
        return tagged;
    }
    if let Some(code) = untagged {
        return vec![code];
    }
    vec![response.trim().to_string()]
}
