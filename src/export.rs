//! Export stored records as keyed record files.
//!
//! Every key matching a glob pattern is read back from the store and
//! written to `<dest>/<key with ':' replaced by '_'>.json` as
//! `{key, value}`. Existing files are skipped unless forced, and keys
//! holding a path separator fail rather than escape `<dest>`. The output
//! can be fed straight back into `semse import`.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use semse_core::index::IndexManager;
use semse_core::models::RecordKey;

use crate::config::Config;
use crate::db;
use crate::progress::{OutcomeReporter, ProgressMode};
use crate::stage::{write_json, FileOutcome, PipelineError, Tally};

async fn export_one(
    index: &IndexManager,
    key: &RecordKey,
    dest: &Path,
    force: bool,
) -> Result<FileOutcome, PipelineError> {
    let stem = key
        .file_stem()
        .ok_or_else(|| PipelineError::UnsafeKey(key.to_string()))?;
    let filename = format!("{}.json", stem);
    let path = dest.join(&filename);
    if !force && path.exists() {
        return Ok(FileOutcome::exists());
    }

    let Some(record) = index.get(key).await? else {
        return Ok(FileOutcome::Skipped {
            reason: "Gone".to_string(),
        });
    };
    write_json(&path, &serde_json::to_value(&record)?)?;
    Ok(FileOutcome::Written { target: filename })
}

/// Export every key matching `pattern` into `dest`.
///
/// Returns `None` when nothing matches.
pub async fn export_records(
    index: &IndexManager,
    pattern: &str,
    dest: &Path,
    force: bool,
    reporter: &dyn OutcomeReporter,
) -> Result<Option<Tally>> {
    let keys = index.scan(pattern).await?;
    if keys.is_empty() {
        return Ok(None);
    }
    eprintln!("Found {} documents, starting export.", keys.len());

    let mut tally = Tally::default();
    for key in &keys {
        let outcome: FileOutcome = export_one(index, key, dest, force).await.into();
        if let FileOutcome::Failed(e) = &outcome {
            tracing::warn!(key = %key, error = %e, "export failed");
        }
        reporter.file(key.as_str(), &outcome);
        tally.record(&outcome);
    }
    Ok(Some(tally))
}

pub async fn run_export(
    config: &Config,
    pattern: &str,
    dest: &Path,
    force: bool,
    mode: ProgressMode,
) -> Result<Option<Tally>> {
    std::fs::create_dir_all(dest)?;
    let store = Arc::new(db::open_store(config).await?);
    let index = db::document_index(config, store.clone());

    let reporter = mode.reporter();
    let result = export_records(&index, pattern, dest, force, reporter.as_ref()).await;
    store.close().await;

    match result? {
        Some(tally) => {
            println!("{}", tally.summary("exported"));
            Ok(Some(tally))
        }
        None => {
            println!("No documents to export.");
            Ok(None)
        }
    }
}
