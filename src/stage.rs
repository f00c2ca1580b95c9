//! Shared machinery for the file-driven pipeline stages.
//!
//! Each stage (structure, embed, keys, import) implements [`Stage`]:
//! one relative input path in, one [`FileOutcome`] out. [`run_stage`]
//! drives a stage over a directory with the [`Walker`], reports every
//! outcome, and returns the [`Tally`].
//!
//! Per-file errors are converted to [`FileOutcome::Failed`] here and
//! never abort the batch.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use semse_core::error::{ServiceError, StoreError, ValidationError};
use semse_core::models::RecordEnvelope;

use crate::progress::{OutcomeReporter, ProgressMode};
use crate::walker::{FileVisitor, TraversalError, Walker};

/// Failure of one file. Never fatal to the batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Empty key")]
    EmptyKey,

    #[error("key {0} cannot be used as a file name")]
    UnsafeKey(String),

    #[error("unusable completion reply: {0}")]
    Reply(String),
}

impl PipelineError {
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
        move |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of processing one file.
#[derive(Debug)]
pub enum FileOutcome {
    /// Output written (or stored) at `target`.
    Written { target: String },
    /// Simulate mode: would have written `target`.
    Simulated { target: String },
    /// Nothing done; `reason` says why.
    Skipped { reason: String },
    Failed(PipelineError),
}

impl FileOutcome {
    pub fn exists() -> Self {
        FileOutcome::Skipped {
            reason: "Exists".to_string(),
        }
    }
}

impl From<Result<FileOutcome, PipelineError>> for FileOutcome {
    fn from(result: Result<FileOutcome, PipelineError>) -> Self {
        result.unwrap_or_else(FileOutcome::Failed)
    }
}

/// Succeeded / skipped / failed counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl Tally {
    /// Count one outcome. Simulated files count as succeeded.
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Written { .. } | FileOutcome::Simulated { .. } => self.succeeded += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// `Finished: N documents <verb>, F failed, S skipped.`
    pub fn summary(&self, verb: &str) -> String {
        format!(
            "Finished: {} documents {}, {} failed, {} skipped.",
            crate::progress::format_number(self.succeeded),
            verb,
            crate::progress::format_number(self.failed),
            crate::progress::format_number(self.skipped),
        )
    }
}

/// Options common to every file stage.
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub input_root: PathBuf,
    /// Defaults to `input_root` (in-place).
    pub output_root: PathBuf,
    pub force: bool,
    pub simulate: bool,
}

impl StageOptions {
    pub fn new(input_root: impl Into<PathBuf>, output_root: Option<PathBuf>) -> Self {
        let input_root = input_root.into();
        Self {
            output_root: output_root.unwrap_or_else(|| input_root.clone()),
            input_root,
            force: false,
            simulate: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// True if an existing `dest` should be left alone.
    pub fn keep_existing(&self, dest: &Path) -> bool {
        !self.force && dest.exists()
    }
}

/// One pipeline stage applied to a single file.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Past-tense verb used in the summary line.
    fn verb(&self) -> &'static str;

    async fn process(&self, relative: &Path) -> FileOutcome;
}

struct StageVisitor<'a, S: ?Sized> {
    stage: &'a S,
    reporter: &'a dyn OutcomeReporter,
}

#[async_trait]
impl<'a, S: Stage + ?Sized> FileVisitor<Tally> for StageVisitor<'a, S> {
    async fn visit(&self, relative: &Path, tally: &mut Tally) {
        let outcome = self.stage.process(relative).await;
        if let FileOutcome::Failed(e) = &outcome {
            tracing::warn!(file = %relative.display(), error = %e, "file failed");
        }
        self.reporter.file(&relative.display().to_string(), &outcome);
        tally.record(&outcome);
    }
}

/// Walk `walker`'s root and run `stage` on every file, sequentially.
pub async fn run_stage<S: Stage + ?Sized>(
    walker: &Walker,
    stage: &S,
    reporter: &dyn OutcomeReporter,
) -> Result<Tally, TraversalError> {
    let visitor = StageVisitor { stage, reporter };
    let mut tally = Tally::default();
    walker.walk(&visitor, &mut tally).await?;
    Ok(tally)
}

/// Run `stage` over `walker` and print the summary line to stdout.
pub async fn run_and_report<S: Stage + ?Sized>(
    walker: &Walker,
    stage: &S,
    mode: ProgressMode,
) -> anyhow::Result<Tally> {
    let reporter = mode.reporter();
    let tally = run_stage(walker, stage, reporter.as_ref()).await?;
    println!("{}", tally.summary(stage.verb()));
    Ok(tally)
}

/// Read and parse a record file in either on-disk shape.
pub fn read_envelope(path: &Path) -> Result<RecordEnvelope, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(PipelineError::io(path))?;
    let value: Value = serde_json::from_str(&raw)?;
    Ok(RecordEnvelope::from_json(value)?)
}

/// Write pretty-printed JSON, creating parent directories.
pub fn write_json(path: &Path, value: &Value) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(PipelineError::io(parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(PipelineError::io(path))
}

/// `path` relative to `root` for display, or the full path if outside it.
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tally_counts_simulated_as_succeeded() {
        let mut tally = Tally::default();
        tally.record(&FileOutcome::Written { target: "a".into() });
        tally.record(&FileOutcome::Simulated { target: "b".into() });
        tally.record(&FileOutcome::exists());
        tally.record(&FileOutcome::Failed(PipelineError::EmptyKey));
        assert_eq!(
            tally,
            Tally {
                succeeded: 2,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(
            tally.summary("converted"),
            "Finished: 2 documents converted, 1 failed, 1 skipped."
        );
    }

    #[test]
    fn test_dest_defaults_to_source() {
        let opts = StageOptions::new("in", None);
        assert_eq!(opts.output_root, PathBuf::from("in"));
        let opts = StageOptions::new("in", Some(PathBuf::from("out")));
        assert_eq!(opts.output_root, PathBuf::from("out"));
    }

    #[test]
    fn test_read_envelope_reports_bad_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_envelope(&path), Err(PipelineError::Json(_))));

        let missing = tmp.path().join("missing.json");
        assert!(matches!(read_envelope(&missing), Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_write_json_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/c.json");
        write_json(&path, &json!({"x": 1})).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, json!({"x": 1}));
    }
}
