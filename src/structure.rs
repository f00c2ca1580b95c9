//! Structuring stage: raw text files → document records.
//!
//! Each text file is sent to the completion service with a fixed
//! instruction prompt. The reply must be a JSON object carrying at
//! least a `title` and optionally a `date`; the original text is
//! attached verbatim as `body`. Output goes to the same relative path
//! with a `.json` extension.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use semse_core::models::DocumentRecord;
use semse_core::validate::{is_truthy, Validator};

use crate::completion::{build_prompt, create_completion, CompletionProvider, DisabledCompletion};
use crate::config::Config;
use crate::progress::ProgressMode;
use crate::stage::{
    display_path, run_and_report, write_json, FileOutcome, PipelineError, Stage, StageOptions,
    Tally,
};
use crate::walker::Walker;

pub struct StructureStage {
    options: StageOptions,
    completion: Arc<dyn CompletionProvider>,
}

impl StructureStage {
    pub fn new(options: StageOptions, completion: Arc<dyn CompletionProvider>) -> Self {
        Self {
            options,
            completion,
        }
    }

    async fn try_process(&self, relative: &Path) -> Result<FileOutcome, PipelineError> {
        let dest_rel = relative.with_extension("json");
        let dest = self.options.output_root.join(&dest_rel);
        if self.options.keep_existing(&dest) {
            return Ok(FileOutcome::exists());
        }

        let src = self.options.input_root.join(relative);
        let text = std::fs::read_to_string(&src).map_err(PipelineError::io(&src))?;

        if self.options.simulate {
            return Ok(FileOutcome::Simulated {
                target: display_path(&self.options.output_root, &dest),
            });
        }

        let reply = self.completion.complete(&build_prompt(&text)).await?;
        let record = record_from_reply(&reply, text, Utc::now())?;
        write_json(&dest, &serde_json::to_value(&record)?)?;

        Ok(FileOutcome::Written {
            target: dest_rel.display().to_string(),
        })
    }
}

#[async_trait]
impl Stage for StructureStage {
    fn verb(&self) -> &'static str {
        "converted"
    }

    async fn process(&self, relative: &Path) -> FileOutcome {
        self.try_process(relative).await.into()
    }
}

/// `semse structure`. Simulated runs never contact the completion service.
pub async fn run_structure(
    config: &Config,
    walker: &Walker,
    options: StageOptions,
    mode: ProgressMode,
) -> anyhow::Result<Tally> {
    let completion: Arc<dyn CompletionProvider> = if options.simulate {
        Arc::new(DisabledCompletion)
    } else {
        create_completion(&config.completion)?
    };
    run_and_report(walker, &StructureStage::new(options, completion), mode).await
}

/// Build a record from a completion reply and the original text.
///
/// The reply is parsed strictly. A missing or empty `date` becomes
/// `now`; anything else in the reply goes through the validator.
pub fn record_from_reply(
    reply: &str,
    body: String,
    now: DateTime<Utc>,
) -> Result<DocumentRecord, PipelineError> {
    let parsed: Value = serde_json::from_str(reply.trim())?;
    let Value::Object(mut fields) = parsed else {
        return Err(PipelineError::Reply("expected a JSON object".to_string()));
    };

    if !fields.get("date").is_some_and(is_truthy) {
        fields.insert(
            "date".to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    fields.insert("body".to_string(), Value::String(body));
    // The reply never supplies an embedding.
    fields.remove("embedding");

    Ok(Validator::new().validate(&fields)?)
}
