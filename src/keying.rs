//! Keying stage: document records → keyed storage records.
//!
//! Every input is validated, then wrapped as `{key, value}` under a
//! freshly minted `<prefix>:<uuid>` key. With `flatten`, outputs are
//! written flat into the destination and named after their key.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use semse_core::models::{normalize_prefix, KeyedRecord, RecordKey};
use semse_core::validate::Validator;

use crate::progress::ProgressMode;
use crate::stage::{
    display_path, read_envelope, run_and_report, write_json, FileOutcome, PipelineError, Stage,
    StageOptions, Tally,
};
use crate::walker::Walker;

pub struct KeyingStage {
    options: StageOptions,
    prefix: String,
    flatten: bool,
}

impl KeyingStage {
    pub fn new(options: StageOptions, prefix: &str, flatten: bool) -> Self {
        Self {
            options,
            prefix: normalize_prefix(prefix).to_string(),
            flatten,
        }
    }

    fn dest_for(&self, relative: &Path, key: &RecordKey) -> Result<PathBuf, PipelineError> {
        if !self.flatten {
            return Ok(self.options.output_root.join(relative));
        }
        let stem = key
            .file_stem()
            .ok_or_else(|| PipelineError::UnsafeKey(key.to_string()))?;
        Ok(self.options.output_root.join(format!("{}.json", stem)))
    }

    async fn try_process(&self, relative: &Path) -> Result<FileOutcome, PipelineError> {
        let src = self.options.input_root.join(relative);
        let envelope = read_envelope(&src)?;
        let value = Validator::new().validate(envelope.fields())?;

        let key = RecordKey::mint(&self.prefix);
        let dest = self.dest_for(relative, &key)?;
        if self.options.keep_existing(&dest) {
            return Ok(FileOutcome::exists());
        }

        let target = format!("{} {}", key, display_path(&self.options.output_root, &dest));
        if self.options.simulate {
            return Ok(FileOutcome::Simulated { target });
        }

        let keyed = KeyedRecord { key, value };
        write_json(&dest, &serde_json::to_value(&keyed)?)?;
        Ok(FileOutcome::Written { target })
    }
}

#[async_trait]
impl Stage for KeyingStage {
    fn verb(&self) -> &'static str {
        "keyed"
    }

    async fn process(&self, relative: &Path) -> FileOutcome {
        self.try_process(relative).await.into()
    }
}

/// `semse keys`.
pub async fn run_keys(
    walker: &Walker,
    options: StageOptions,
    prefix: &str,
    flatten: bool,
    mode: ProgressMode,
) -> anyhow::Result<Tally> {
    if normalize_prefix(prefix).is_empty() {
        anyhow::bail!("prefix must not be empty");
    }
    run_and_report(walker, &KeyingStage::new(options, prefix, flatten), mode).await
}
