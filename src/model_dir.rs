//! On-disk model directory contract.
//!
//! A model directory holds `config.json`, `tokenizer_config.json`, the
//! tokenizer files for its family, and (for the candle backend) weights.
//! Unknown JSON fields are ignored.

use crate::error::{Result, TaskError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
pub const VOCAB_TXT_FILE: &str = "vocab.txt";
pub const WEIGHTS_FILE: &str = "model.safetensors";

const DEFAULT_MAX_POSITION_EMBEDDINGS: usize = 512;
const DEFAULT_HIDDEN_SIZE: usize = 768;

fn default_max_position_embeddings() -> usize {
    DEFAULT_MAX_POSITION_EMBEDDINGS
}

fn default_hidden_size() -> usize {
    DEFAULT_HIDDEN_SIZE
}

/// The subset of `config.json` the task layer reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Declared model family, e.g. `bert`, `electra`, `marian`.
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
    #[serde(default)]
    pub eos_token_id: Option<u32>,
    #[serde(default)]
    pub decoder_start_token_id: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: String::new(),
            id2label: HashMap::new(),
            max_position_embeddings: DEFAULT_MAX_POSITION_EMBEDDINGS,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            pad_token_id: None,
            eos_token_id: None,
            decoder_start_token_id: None,
        }
    }
}

impl ModelConfig {
    /// Class labels ordered by index.
    ///
    /// A config without `id2label` is assumed to be a binary classifier and
    /// yields `["LABEL_0", "LABEL_1"]`.
    pub fn labels(&self) -> Result<Vec<String>> {
        if self.id2label.is_empty() {
            return Ok(vec!["LABEL_0".to_string(), "LABEL_1".to_string()]);
        }
        let mut labels = vec![None; self.id2label.len()];
        for (key, label) in &self.id2label {
            let index: usize = key.parse().map_err(|_| {
                TaskError::Config(format!("id2label key '{}' is not an integer", key))
            })?;
            let slot = labels.get_mut(index).ok_or_else(|| {
                TaskError::Config(format!(
                    "id2label index {} out of range for {} labels",
                    index,
                    self.id2label.len()
                ))
            })?;
            *slot = Some(label.clone());
        }
        labels
            .into_iter()
            .enumerate()
            .map(|(i, l)| {
                l.ok_or_else(|| TaskError::Config(format!("id2label is missing index {}", i)))
            })
            .collect()
    }
}

/// The subset of `tokenizer_config.json` the task layer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub do_lower_case: bool,
}

/// An opened, parsed model directory.
#[derive(Debug, Clone)]
pub struct ModelDirectory {
    root: PathBuf,
    config: ModelConfig,
    tokenizer_config: TokenizerConfig,
    config_json: String,
}

impl ModelDirectory {
    /// Read and parse `config.json` and `tokenizer_config.json` under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TaskError::Config(format!(
                "Model directory '{}' does not exist",
                root.display()
            )));
        }
        let config_json = read_file(&root.join(CONFIG_FILE))?;
        let config: ModelConfig = serde_json::from_str(&config_json).map_err(|e| {
            TaskError::Config(format!("Malformed {} in '{}': {}", CONFIG_FILE, root.display(), e))
        })?;
        let tokenizer_json = read_file(&root.join(TOKENIZER_CONFIG_FILE))?;
        let tokenizer_config: TokenizerConfig =
            serde_json::from_str(&tokenizer_json).map_err(|e| {
                TaskError::Config(format!(
                    "Malformed {} in '{}': {}",
                    TOKENIZER_CONFIG_FILE,
                    root.display(),
                    e
                ))
            })?;
        Ok(Self {
            root,
            config,
            tokenizer_config,
            config_json,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tokenizer_config(&self) -> &TokenizerConfig {
        &self.tokenizer_config
    }

    /// The verbatim `config.json`, for backends that parse their own view.
    pub fn config_json(&self) -> &str {
        &self.config_json
    }

    pub fn model_type(&self) -> &str {
        &self.config.model_type
    }

    /// Path to `name` inside the directory, failing if it does not exist.
    pub fn require_file(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TaskError::Config(format!(
                "Missing required file '{}' in model directory '{}'",
                name,
                self.root.display()
            )))
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| TaskError::Config(format!("Failed to read '{}': {}", path.display(), e)))
}
