//! Model-forward seam.
//!
//! Tasks own the tokenizer and the decode logic; everything numeric happens
//! behind these traits. A backend receives token ids (and segment ids) and
//! returns raw per-position scores. Backends must be safe for concurrent use.

#[cfg(feature = "backend-candle")]
pub mod candle;

use crate::api::GenerationOptions;
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::tokenizer::TokenizedInput;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces one hidden-state vector per input position.
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    async fn encode(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>>;
}

/// Produces one label-logit vector per input position.
#[async_trait]
pub trait TokenClassifierBackend: Send + Sync {
    async fn classify_tokens(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>>;
}

/// Start and end logits, one per input position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpanLogits {
    pub start: Vec<f32>,
    pub end: Vec<f32>,
}

/// Produces answer-span start/end logits.
#[async_trait]
pub trait SpanClassifierBackend: Send + Sync {
    async fn span_logits(&self, input: &TokenizedInput) -> Result<SpanLogits>;
}

/// Produces one label-logit vector for the whole sequence.
#[async_trait]
pub trait SequenceClassifierBackend: Send + Sync {
    async fn classify_sequence(&self, input: &TokenizedInput) -> Result<Vec<f32>>;
}

/// One generated output sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSequence {
    /// Generated token ids, possibly including special ids.
    pub ids: Vec<u32>,
    /// Sequence log-probability (higher is better).
    pub score: f64,
}

/// Runs the autoregressive decoding loop for encoder-decoder models.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        input_ids: &[u32],
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedSequence>>;
}

/// Builds backends from an opened model directory.
///
/// Each constructor defaults to a [`TaskError::Config`] so a loader only
/// implements the heads it supports.
pub trait BackendLoader: Send + Sync {
    /// Identifier used in logs, e.g. `"candle"`.
    fn name(&self) -> &'static str;

    fn encoder(&self, dir: &ModelDirectory) -> Result<Arc<dyn EncoderBackend>> {
        Err(self.unsupported(dir, "encoder"))
    }

    fn token_classifier(
        &self,
        dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn TokenClassifierBackend>> {
        let _ = num_labels;
        Err(self.unsupported(dir, "token classifier"))
    }

    fn span_classifier(&self, dir: &ModelDirectory) -> Result<Arc<dyn SpanClassifierBackend>> {
        Err(self.unsupported(dir, "span classifier"))
    }

    fn sequence_classifier(
        &self,
        dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn SequenceClassifierBackend>> {
        let _ = num_labels;
        Err(self.unsupported(dir, "sequence classifier"))
    }

    fn generator(&self, dir: &ModelDirectory) -> Result<Arc<dyn GenerationBackend>> {
        Err(self.unsupported(dir, "generator"))
    }

    #[doc(hidden)]
    fn unsupported(&self, dir: &ModelDirectory, head: &str) -> TaskError {
        TaskError::Config(format!(
            "Backend '{}' cannot build a {} for model type '{}'",
            self.name(),
            head,
            dir.model_type()
        ))
    }
}

/// A loader that builds nothing. Used when no numeric backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackend;

impl BackendLoader for NoBackend {
    fn name(&self) -> &'static str {
        "none"
    }
}

/// The loader compiled in by default.
#[cfg(feature = "backend-candle")]
pub fn default_loader() -> Arc<dyn BackendLoader> {
    Arc::new(candle::CandleBackendLoader::new())
}

/// The loader compiled in by default.
#[cfg(not(feature = "backend-candle"))]
pub fn default_loader() -> Arc<dyn BackendLoader> {
    Arc::new(NoBackend)
}

/// Check that a backend returned exactly one row per input position.
pub(crate) fn check_rows<T>(rows: &[T], expected: usize, what: &str) -> Result<()> {
    if rows.len() != expected {
        return Err(TaskError::Inference(format!(
            "{} returned {} positions for {} input tokens",
            what,
            rows.len(),
            expected
        )));
    }
    Ok(())
}
