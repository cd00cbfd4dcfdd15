//! Write-only terminal sink
//!
//! All user-visible output funnels through one [`Renderer`] handle that
//! the controller, the parsers and the RLM runner share. Styling is
//! gated on ANSI support; without it every nicety degrades to plain
//! lines, including the in-place "tool done" rewrite.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use colored::Colorize;
use crossterm::QueueableCommand;
use crossterm::cursor::MoveToPreviousLine;
use crossterm::terminal::{Clear, ClearType};
use rlmcore::VerifyRecord;

use crate::agent::AgentOutcome;

struct Inner {
    out: Box<dyn Write + Send>,
    ansi: bool,
    /// ID of the most recently started tool, if its line is still the
    /// last thing on screen
    last_tool: Option<String>,
}

/// Cheap-to-clone handle over the output sink
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<Mutex<Inner>>,
}

impl Renderer {
    pub fn stdout() -> Self {
        let ansi = io::stdout().is_terminal();
        Self::with_sink(Box::new(io::stdout()), ansi)
    }

    pub fn with_sink(out: Box<dyn Write + Send>, ansi: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                out,
                ansi,
                last_tool: None,
            })),
        }
    }

    /// In-memory renderer for tests
    pub fn memory() -> (Self, MemorySink) {
        let sink = MemorySink::default();
        (Self::with_sink(Box::new(sink.clone()), false), sink)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raw assistant text, written as-is
    pub fn text(&self, s: &str) {
        let mut inner = self.lock();
        inner.last_tool = None;
        let _ = write!(inner.out, "{s}");
        let _ = inner.out.flush();
    }

    pub fn line(&self, s: &str) {
        let mut inner = self.lock();
        inner.last_tool = None;
        let _ = writeln!(inner.out, "{s}");
        let _ = inner.out.flush();
    }

    pub fn tool_started(&self, id: &str, name: &str) {
        let mut inner = self.lock();
        let line = if inner.ansi {
            format!("{} {} ...", "→".cyan(), name.bold())
        } else {
            format!("→ {name} ...")
        };
        let _ = writeln!(inner.out, "{line}");
        let _ = inner.out.flush();
        inner.last_tool = Some(id.to_string());
    }

    /// Rewrites the "started" line in place when it is still the last
    /// line on screen; otherwise emits a plain second line.
    pub fn tool_done(&self, id: &str, name: &str) {
        let mut inner = self.lock();
        let line = if inner.ansi {
            format!("{} {}", "✓".green(), name.bold())
        } else {
            format!("✓ {name}")
        };
        let in_place = inner.ansi && inner.last_tool.as_deref() == Some(id);
        if in_place {
            let _ = inner.out.queue(MoveToPreviousLine(1));
            let _ = inner.out.queue(Clear(ClearType::CurrentLine));
        }
        let _ = writeln!(inner.out, "{line}");
        let _ = inner.out.flush();
        inner.last_tool = None;
    }

    pub fn header(&self, provider: &str, model: &str, prompt: &str, max_iterations: u32) {
        let bound = if max_iterations == 0 {
            "unlimited".to_string()
        } else {
            max_iterations.to_string()
        };
        self.line(&format!("ralph · agent {provider} ({model}) · prompt {prompt} · max {bound}"));
    }

    pub fn iteration(&self, n: u32, max: u32, phase: Option<&str>) {
        let bound = if max == 0 { "unlimited".to_string() } else { max.to_string() };
        let suffix = phase.map(|p| format!(" · phase {p}")).unwrap_or_default();
        let banner = format!("━━ iteration {n}/{bound}{suffix} ━━");
        let mut inner = self.lock();
        inner.last_tool = None;
        let styled = if inner.ansi { banner.bold().to_string() } else { banner };
        let _ = writeln!(inner.out, "\n{styled}");
        let _ = inner.out.flush();
    }

    pub fn summary(&self, outcome: &AgentOutcome) {
        let secs = outcome.duration_ms as f64 / 1000.0;
        let mut parts = vec![
            format!("{secs:.1}s"),
            format!("{} turns", outcome.turns),
            format!(
                "{} in / {} out tokens",
                outcome.usage.input_tokens, outcome.usage.output_tokens
            ),
        ];
        if outcome.usage.cache_read_tokens > 0 {
            parts.push(format!("{} cached", outcome.usage.cache_read_tokens));
        }
        if let Some(cost) = outcome.cost_usd {
            parts.push(format!("${cost:.4}"));
        }
        let status = if outcome.is_error { " · ERROR" } else { "" };
        let line = format!("─ {}{status}", parts.join(" · "));
        let mut inner = self.lock();
        inner.last_tool = None;
        let styled = if inner.ansi && outcome.is_error {
            line.red().to_string()
        } else if inner.ansi {
            line.dimmed().to_string()
        } else {
            line
        };
        let _ = writeln!(inner.out, "{styled}");
        let _ = inner.out.flush();
    }

    pub fn completion(&self) {
        let mut inner = self.lock();
        inner.last_tool = None;
        let banner = "══ Session Complete ══";
        let styled = if inner.ansi { banner.green().bold().to_string() } else { banner.to_string() };
        let _ = writeln!(inner.out, "\n{styled}");
        let _ = inner.out.flush();
    }

    pub fn max_iterations(&self, max: u32) {
        self.line(&format!("\nreached max iterations ({max}), stopping"));
    }

    pub fn verify_report(&self, report: &VerifyRecord) {
        let mut inner = self.lock();
        inner.last_tool = None;
        let title = if report.passed { "verification passed" } else { "verification FAILED" };
        let styled = if inner.ansi {
            if report.passed { title.green().to_string() } else { title.red().bold().to_string() }
        } else {
            title.to_string()
        };
        let _ = writeln!(inner.out, "┌─ {styled}");
        for check in &report.checks {
            let mark = if check.passed { "✓" } else { "✗" };
            let _ = writeln!(inner.out, "│ {mark} {}", check.name);
            if let Some(err) = &check.error {
                let _ = writeln!(inner.out, "│   {err}");
            }
        }
        let _ = writeln!(inner.out, "└─");
        let _ = inner.out.flush();
    }

    pub fn notice(&self, msg: &str) {
        let mut inner = self.lock();
        inner.last_tool = None;
        let styled = if inner.ansi { msg.yellow().to_string() } else { msg.to_string() };
        let _ = writeln!(inner.out, "{styled}");
        let _ = inner.out.flush();
    }

    pub fn error(&self, msg: &str) {
        let mut inner = self.lock();
        inner.last_tool = None;
        let styled = if inner.ansi {
            format!("{} {msg}", "error:".red().bold())
        } else {
            format!("error: {msg}")
        };
        let _ = writeln!(inner.out, "{styled}");
        let _ = inner.out.flush();
    }
}

/// Shared byte buffer usable as a renderer sink in tests
#[derive(Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(|e| e.into_inner())).to_string()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_lines_plain_without_ansi() {
        let (renderer, sink) = Renderer::memory();
        renderer.tool_started("t1", "Read");
        renderer.tool_done("t1", "Read");
        let out = sink.contents();
        assert!(out.contains("→ Read ..."));
        assert!(out.contains("✓ Read"));
    }

    #[test]
    fn test_text_then_tool_then_done() {
        let (renderer, sink) = Renderer::memory();
        renderer.text("hi \n");
        renderer.tool_started("t1", "Read");
        renderer.tool_done("t1", "Read");
        renderer.text("done");
        let out = sink.contents();
        let hi = out.find("hi").unwrap();
        let started = out.find("→ Read").unwrap();
        let finished = out.find("✓ Read").unwrap();
        let tail = out.find("done").unwrap();
        assert!(hi < started && started < finished && finished < tail);
    }

    #[test]
    fn test_summary_marks_errors() {
        let (renderer, sink) = Renderer::memory();
        let mut outcome = AgentOutcome::new("claude");
        outcome.duration_ms = 1500;
        outcome.is_error = true;
        renderer.summary(&outcome);
        assert!(sink.contents().contains("ERROR"));
    }

    #[test]
    fn test_header_unlimited() {
        let (renderer, sink) = Renderer::memory();
        renderer.header("claude", "sonnet", ".ralph/PROMPT.md", 0);
        assert!(sink.contents().contains("max unlimited"));
    }
}
