//! Per-file outcome reporting.
//!
//! Every file a stage touches gets one line: `<path>... Ok`,
//! `<path>... Exists, skipping.`, or `<path>... Failed: <reason>`.
//! Lines go to **stderr** so stdout stays parseable for scripts; the
//! final tally is printed to stdout by the command itself.

use std::io::Write;

use crate::stage::FileOutcome;

/// Receives one event per processed file.
pub trait OutcomeReporter: Send + Sync {
    fn file(&self, path: &str, outcome: &FileOutcome);
}

/// Human-friendly lines on stderr.
pub struct StderrReporter;

impl OutcomeReporter for StderrReporter {
    fn file(&self, path: &str, outcome: &FileOutcome) {
        let line = format!("{}... {}\n", path, human_outcome(outcome));
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

fn human_outcome(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Written { target } => format!("{} Ok.", target),
        FileOutcome::Simulated { target } => format!("{} Ok (simulated).", target),
        FileOutcome::Skipped { reason } => format!("{}, skipping.", reason),
        FileOutcome::Failed(e) => format!("Failed: {}", e),
    }
}

/// Machine-readable events: one JSON object per line on stderr.
pub struct JsonReporter;

impl OutcomeReporter for JsonReporter {
    fn file(&self, path: &str, outcome: &FileOutcome) {
        let obj = outcome_json(path, outcome);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn outcome_json(path: &str, outcome: &FileOutcome) -> serde_json::Value {
    match outcome {
        FileOutcome::Written { target } => serde_json::json!({
            "event": "file", "path": path, "outcome": "ok", "target": target
        }),
        FileOutcome::Simulated { target } => serde_json::json!({
            "event": "file", "path": path, "outcome": "simulated", "target": target
        }),
        FileOutcome::Skipped { reason } => serde_json::json!({
            "event": "file", "path": path, "outcome": "skipped", "reason": reason
        }),
        FileOutcome::Failed(e) => serde_json::json!({
            "event": "file", "path": path, "outcome": "failed", "reason": e.to_string()
        }),
    }
}

/// No-op reporter.
pub struct NoReporter;

impl OutcomeReporter for NoReporter {
    fn file(&self, _path: &str, _outcome: &FileOutcome) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Reporting mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human lines when stderr is a TTY, otherwise JSON lines,
    /// so every file's outcome is reported either way.
    pub fn default_for_tty() -> Self {
        Self::default_for(atty::is(atty::Stream::Stderr))
    }

    fn default_for(is_tty: bool) -> Self {
        if is_tty {
            ProgressMode::Human
        } else {
            ProgressMode::Json
        }
    }

    pub fn reporter(&self) -> Box<dyn OutcomeReporter> {
        match self {
            ProgressMode::Off => Box::new(NoReporter),
            ProgressMode::Human => Box::new(StderrReporter),
            ProgressMode::Json => Box::new(JsonReporter),
        }
    }
}
