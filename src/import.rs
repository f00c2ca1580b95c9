//! Import stage: keyed record files → store.
//!
//! Each file must be a keyed record with a non-empty key. The value is
//! validated against the index dimensionality and written with
//! [`IndexManager::put`]. An entry already stored under the key is left
//! alone unless forced.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use semse_core::index::IndexManager;
use semse_core::models::KeyedRecord;
use semse_core::validate::Validator;

use crate::config::Config;
use crate::db;
use crate::progress::ProgressMode;
use crate::stage::{
    read_envelope, run_and_report, FileOutcome, PipelineError, Stage, StageOptions, Tally,
};
use crate::walker::Walker;

pub struct ImportStage {
    options: StageOptions,
    index: IndexManager,
}

impl ImportStage {
    pub fn new(options: StageOptions, index: IndexManager) -> Self {
        Self { options, index }
    }

    async fn try_process(&self, relative: &Path) -> Result<FileOutcome, PipelineError> {
        let src = self.options.input_root.join(relative);
        let envelope = read_envelope(&src)?;
        let key = envelope.key().cloned().ok_or(PipelineError::EmptyKey)?;
        let value = Validator::with_dims(self.index.dims()).validate(envelope.fields())?;

        if !key.in_namespace(self.index.prefix()) {
            tracing::warn!(
                key = %key,
                prefix = %self.index.prefix(),
                "key is outside the index prefix and will not be searchable"
            );
        }
        if value.embedding.is_none() {
            tracing::warn!(key = %key, "record has no embedding and will not be searchable");
        }

        if !self.options.force && self.index.exists(&key).await? {
            return Ok(FileOutcome::exists());
        }

        let target = key.to_string();
        if self.options.simulate {
            return Ok(FileOutcome::Simulated { target });
        }

        self.index.put(&KeyedRecord { key, value }).await?;
        Ok(FileOutcome::Written { target })
    }
}

#[async_trait]
impl Stage for ImportStage {
    fn verb(&self) -> &'static str {
        "imported"
    }

    async fn process(&self, relative: &Path) -> FileOutcome {
        self.try_process(relative).await.into()
    }
}

/// `semse import`.
///
/// The index is created first unless simulating. An index that exists
/// with a different schema is fatal.
pub async fn run_import(
    config: &Config,
    walker: &Walker,
    options: StageOptions,
    mode: ProgressMode,
) -> anyhow::Result<Tally> {
    let store = Arc::new(db::open_store(config).await?);
    let index = db::document_index(config, store.clone());

    let result = async {
        let schema = index
            .ensure_index(!options.simulate)
            .await
            .with_context(|| format!("Failed to prepare index {}", index.name()))?;
        if schema.is_none() {
            tracing::warn!(index = %index.name(), "index does not exist and was not created (simulate)");
        }
        run_and_report(walker, &ImportStage::new(options, index.clone()), mode).await
    }
    .await;

    store.close().await;
    result
}
