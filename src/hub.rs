//! Model download from the Hugging Face Hub (`hub` feature).
//!
//! Files are fetched into the hub cache under the models root and then
//! copied into the flat model directory layout the loader reads.

use crate::error::{Result, TaskError};
use crate::model_dir::{CONFIG_FILE, TOKENIZER_CONFIG_FILE, VOCAB_TXT_FILE, WEIGHTS_FILE};
use crate::tokenizer::sentencepiece::{SOURCE_SPM_FILE, SPIECE_MODEL_FILE, VOCAB_JSON_FILE};
use hf_hub::api::tokio::ApiBuilder;
use std::path::Path;

/// Files copied into the model directory when the repository has them.
pub const MODEL_FILES: &[&str] = &[
    CONFIG_FILE,
    TOKENIZER_CONFIG_FILE,
    VOCAB_TXT_FILE,
    VOCAB_JSON_FILE,
    SOURCE_SPM_FILE,
    SPIECE_MODEL_FILE,
    WEIGHTS_FILE,
];

const HUB_CACHE_DIR: &str = ".hub-cache";

/// Download `model_id` into `target` unless `target` already holds a
/// `config.json`.
#[tracing::instrument(skip(target), fields(target = %target.display()))]
pub async fn ensure_model(model_id: &str, target: &Path) -> Result<()> {
    if target.join(CONFIG_FILE).is_file() {
        tracing::debug!("Model already present");
        return Ok(());
    }
    let cache_root = target
        .parent()
        .map(|p| p.join(HUB_CACHE_DIR))
        .unwrap_or_else(|| Path::new(HUB_CACHE_DIR).to_path_buf());

    let api = ApiBuilder::new()
        .with_cache_dir(cache_root)
        .with_progress(false)
        .build()
        .map_err(|e| TaskError::Config(format!("Failed to initialize hub client: {}", e)))?;
    let repo = api.model(model_id.to_string());
    let info = repo
        .info()
        .await
        .map_err(|e| TaskError::Config(format!("Failed to query '{}': {}", model_id, e)))?;

    std::fs::create_dir_all(target).map_err(|e| {
        TaskError::Config(format!("Failed to create '{}': {}", target.display(), e))
    })?;

    for sibling in &info.siblings {
        let name = sibling.rfilename.as_str();
        if !MODEL_FILES.contains(&name) {
            continue;
        }
        tracing::info!(model = model_id, file = name, "Downloading model file");
        let cached = repo
            .get(name)
            .await
            .map_err(|e| TaskError::Config(format!("Failed to download '{}': {}", name, e)))?;
        std::fs::copy(&cached, target.join(name)).map_err(|e| {
            TaskError::Config(format!("Failed to copy '{}': {}", cached.display(), e))
        })?;
    }

    if !target.join(CONFIG_FILE).is_file() {
        return Err(TaskError::Config(format!(
            "Repository '{}' has no {}",
            model_id, CONFIG_FILE
        )));
    }
    // Older repositories ship no tokenizer config; the loader defaults every field.
    let tokenizer_config = target.join(TOKENIZER_CONFIG_FILE);
    if !tokenizer_config.is_file() {
        std::fs::write(&tokenizer_config, "{}").map_err(|e| {
            TaskError::Config(format!(
                "Failed to write '{}': {}",
                tokenizer_config.display(),
                e
            ))
        })?;
    }
    Ok(())
}
