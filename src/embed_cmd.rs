//! Embedding stage: document records → embedded document records.
//!
//! Adds an `embedding` field computed from `<h1>{title}</h1>\n{body}`.
//! Nothing else in the file changes, and both bare and keyed records
//! keep their shape. Records that already carry an embedding are
//! skipped unless forced, so a partially embedded corpus can be re-run.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use semse_core::embedding::Embedder;
use semse_core::error::{FieldError, ValidationError};
use semse_core::validate::Validator;

use crate::config::Config;
use crate::embedding::{create_embedder, DisabledEmbedder};
use crate::progress::ProgressMode;
use crate::stage::{
    display_path, read_envelope, run_and_report, write_json, FileOutcome, PipelineError, Stage,
    StageOptions, Tally,
};
use crate::walker::Walker;

pub struct EmbedStage {
    options: StageOptions,
    embedder: Arc<dyn Embedder>,
}

impl EmbedStage {
    pub fn new(options: StageOptions, embedder: Arc<dyn Embedder>) -> Self {
        Self { options, embedder }
    }

    async fn try_process(&self, relative: &Path) -> Result<FileOutcome, PipelineError> {
        let src = self.options.input_root.join(relative);
        let dest = self.options.output_root.join(relative);

        let mut envelope = read_envelope(&src)?;
        // A forced run replaces whatever embedding is there, so its length is not checked.
        let validator = if self.options.force {
            Validator::new()
        } else {
            Validator::with_dims(self.embedder.dims())
        };
        let record = validator.validate(envelope.fields())?;

        if !self.options.force {
            if record.has_embedding() {
                return Ok(FileOutcome::Skipped {
                    reason: "Already embedded".to_string(),
                });
            }
            if dest != src && dest.exists() {
                return Ok(FileOutcome::exists());
            }
        }

        if self.options.simulate {
            return Ok(FileOutcome::Simulated {
                target: display_path(&self.options.output_root, &dest),
            });
        }

        let vector = self.embedder.embed(&record.embedding_text()).await?;
        let dims = self.embedder.dims();
        if vector.len() != dims {
            return Err(ValidationError::new(vec![FieldError::EmbeddingDimensions {
                expected: dims,
                actual: vector.len(),
            }])
            .into());
        }

        envelope
            .fields_mut()
            .insert("embedding".to_string(), serde_json::to_value(&vector)?);
        let json: Value = envelope.into_json();
        write_json(&dest, &json)?;

        Ok(FileOutcome::Written {
            target: relative.display().to_string(),
        })
    }
}

#[async_trait]
impl Stage for EmbedStage {
    fn verb(&self) -> &'static str {
        "embedded"
    }

    async fn process(&self, relative: &Path) -> FileOutcome {
        self.try_process(relative).await.into()
    }
}

/// `semse embed`. Simulated runs never contact the embedding service.
pub async fn run_embed(
    config: &Config,
    walker: &Walker,
    options: StageOptions,
    mode: ProgressMode,
) -> anyhow::Result<Tally> {
    let embedder: Arc<dyn Embedder> = if options.simulate {
        Arc::new(DisabledEmbedder::new(config.embedding.dims))
    } else {
        create_embedder(&config.embedding)?
    };
    run_and_report(walker, &EmbedStage::new(options, embedder), mode).await
}
