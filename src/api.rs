//! Public API types: task kinds, load descriptors, request options, and the
//! structured results each task produces.

use crate::error::{Result, TaskError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The task capability a model directory is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Produce one dense vector per input text.
    TextEncoding,
    /// Label tokens/words and aggregate them into entities.
    TokenClassification,
    /// Score the model's own labels for a whole text.
    TextClassification,
    /// Extract answer spans from a passage.
    QuestionAnswering,
    /// Score arbitrary candidate labels through entailment.
    ZeroShotClassification,
    /// Generate text completions.
    TextGeneration,
}

impl TaskKind {
    /// Every task kind, in a stable order.
    pub const ALL: [TaskKind; 6] = [
        Self::TextEncoding,
        Self::TokenClassification,
        Self::TextClassification,
        Self::QuestionAnswering,
        Self::ZeroShotClassification,
        Self::TextGeneration,
    ];

    /// Lower-case package segment used in service names and HTTP paths.
    pub fn package(&self) -> &'static str {
        match self {
            Self::TextEncoding => "textencoding",
            Self::TokenClassification => "tokenclassification",
            Self::TextClassification => "textclassification",
            Self::QuestionAnswering => "questionanswering",
            Self::ZeroShotClassification => "zeroshotclassification",
            Self::TextGeneration => "textgeneration",
        }
    }

    /// Fully-qualified RPC service name, e.g. `textencoding.v1.TextEncodingService`.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::TextEncoding => "textencoding.v1.TextEncodingService",
            Self::TokenClassification => "tokenclassification.v1.TokenClassificationService",
            Self::TextClassification => "textclassification.v1.TextClassificationService",
            Self::QuestionAnswering => "questionanswering.v1.QuestionAnsweringService",
            Self::ZeroShotClassification => {
                "zeroshotclassification.v1.ZeroShotClassificationService"
            }
            Self::TextGeneration => "textgeneration.v1.TextGenerationService",
        }
    }

    /// The single primary method exposed by the task's service.
    pub fn method(&self) -> &'static str {
        match self {
            Self::TextEncoding => "Encode",
            Self::TokenClassification
            | Self::TextClassification
            | Self::ZeroShotClassification => "Classify",
            Self::QuestionAnswering => "Answer",
            Self::TextGeneration => "Generate",
        }
    }

    /// HTTP route derived from the service table: `/v1/{package}/{method}`.
    pub fn http_path(&self) -> String {
        format!("/v1/{}/{}", self.package(), self.method().to_lowercase())
    }

    /// Resolve a task kind from its service name.
    pub fn from_service_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.service_name() == name)
    }

    /// Resolve a task kind from its package segment.
    pub fn from_package(package: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.package() == package)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TextEncoding => "text_encoding",
            Self::TokenClassification => "token_classification",
            Self::TextClassification => "text_classification",
            Self::QuestionAnswering => "question_answering",
            Self::ZeroShotClassification => "zero_shot_classification",
            Self::TextGeneration => "text_generation",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskKind {
    type Err = TaskError;

    /// Accepts the snake_case name, the kebab-case name, or the package name.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.to_string() == normalized || k.package() == normalized)
            .ok_or_else(|| TaskError::Config(format!("Unknown task '{}'", s)))
    }
}

/// Immutable description of what to load: a task kind and a model directory.
///
/// # Example JSON
///
/// ```json
/// {
///   "kind": "question_answering",
///   "model_directory": "models/deepset/bert-base-cased-squad2",
///   "model_name": "deepset/bert-base-cased-squad2"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// The capability requested from the model.
    pub kind: TaskKind,
    /// Directory containing `config.json`, the tokenizer files, and weights.
    pub model_directory: PathBuf,
    /// Human-readable model name, used in logs and metrics.
    #[serde(default)]
    pub model_name: String,
}

impl TaskDescriptor {
    /// Build a descriptor, naming the model after its directory.
    pub fn new(kind: TaskKind, model_directory: impl Into<PathBuf>) -> Self {
        let model_directory = model_directory.into();
        let model_name = model_directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            kind,
            model_directory,
            model_name,
        }
    }

    /// Override the model name.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Validate invariants: the model directory path must be non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.model_directory.as_os_str().is_empty() {
            return Err(TaskError::Config(
                "Model directory cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a descriptor from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let mut descriptor: Self = serde_json::from_str(s)
            .map_err(|e| TaskError::Config(format!("Invalid TaskDescriptor JSON: {}", e)))?;
        descriptor.validate()?;
        if descriptor.model_name.is_empty() {
            descriptor = Self::new(descriptor.kind, descriptor.model_directory);
        }
        Ok(descriptor)
    }

    /// Read and parse a descriptor from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Config(format!(
                "Failed to read descriptor file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }
}

/// Strategy reducing per-token vectors to one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// Take the vector of the class/start token.
    #[default]
    Cls,
    /// Arithmetic mean over the non-special token vectors.
    Mean,
    /// Element-wise maximum over the non-special token vectors.
    Max,
}

/// Policy for merging token-level predictions into entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// One entity per raw token, labels as predicted.
    #[default]
    None,
    /// Merge consecutive words sharing a label and drop the background class.
    Simple,
}

/// Options for token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenClassificationParameters {
    #[serde(default)]
    pub aggregation_strategy: AggregationStrategy,
}

pub const DEFAULT_MAX_ANSWERS: usize = 3;
pub const DEFAULT_MAX_ANSWER_LENGTH: usize = 20;
pub const DEFAULT_MAX_CANDIDATES: usize = 20;
pub const DEFAULT_MIN_SCORE: f64 = 0.0;

/// Options for extractive question answering.
///
/// Zero-valued counts mean "use the default", mirroring how absent fields
/// arrive over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct QuestionAnsweringOptions {
    /// Maximum number of answers returned.
    #[serde(default)]
    pub max_answers: usize,
    /// Maximum answer length, in tokens.
    #[serde(default)]
    pub max_answer_length: usize,
    /// Number of top-ranked candidate spans considered before filtering.
    #[serde(default)]
    pub max_candidates: usize,
    /// Minimum normalized score an answer must reach.
    #[serde(default)]
    pub min_score: f64,
}

impl QuestionAnsweringOptions {
    /// Replace zero-valued counts with the crate defaults.
    pub fn resolved(&self) -> Self {
        fn or_default(v: usize, d: usize) -> usize {
            if v == 0 { d } else { v }
        }
        Self {
            max_answers: or_default(self.max_answers, DEFAULT_MAX_ANSWERS),
            max_answer_length: or_default(self.max_answer_length, DEFAULT_MAX_ANSWER_LENGTH),
            max_candidates: or_default(self.max_candidates, DEFAULT_MAX_CANDIDATES),
            min_score: self.min_score,
        }
    }
}

pub const DEFAULT_HYPOTHESIS_TEMPLATE: &str = "This example is {}.";

/// Options for zero-shot classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ZeroShotParameters {
    /// Potential classes for the input (required, non-empty).
    pub candidate_labels: Vec<String>,
    /// Template interpolated with each label at `{}`. Empty means
    /// [`DEFAULT_HYPOTHESIS_TEMPLATE`].
    #[serde(default)]
    pub hypothesis_template: String,
    /// When `true` labels are scored independently.
    #[serde(default)]
    pub multi_label: bool,
}

impl ZeroShotParameters {
    /// The effective hypothesis template.
    pub fn template(&self) -> &str {
        if self.hypothesis_template.is_empty() {
            DEFAULT_HYPOTHESIS_TEMPLATE
        } else {
            &self.hypothesis_template
        }
    }
}

/// Options for text classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TextClassificationParameters {
    /// Keep only the `top_k` best labels. All labels when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

/// Length and sampling parameters for text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerationOptions {
    /// Maximum number of generated tokens. Backend default if `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Minimum number of generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Beam width for beam search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_beams: Option<usize>,
    /// Number of completions returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_return_sequences: Option<usize>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Top-k sampling cut-off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Nucleus sampling threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Sample instead of decoding greedily / with beams.
    #[serde(default)]
    pub use_sampling: bool,
}

/// A label with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub score: f64,
}

/// An aggregated token classification result. `start`/`end` are byte offsets
/// into the request text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
}

/// An extracted answer. `start`/`end` are byte offsets into the passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

/// A pooled dense representation of one input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingVector {
    pub vector: Vec<f32>,
    pub pooling: PoolingStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenClassificationResponse {
    pub entities: Vec<Entity>,
}

/// Answers sorted by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnswerResponse {
    pub answers: Vec<Answer>,
}

/// Model labels sorted by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextClassificationResponse {
    pub classes: Vec<ClassificationResult>,
}

/// Candidate labels sorted by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ZeroShotResponse {
    pub classes: Vec<ClassificationResult>,
}

/// Generated completions with their sequence scores, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerationResponse {
    pub texts: Vec<String>,
    pub scores: Vec<f64>,
}
