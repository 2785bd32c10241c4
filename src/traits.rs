//! Task capability traits.
//!
//! One trait per [`TaskKind`](crate::api::TaskKind). Loaded tasks, the
//! in-process server path, and the remote client stubs all implement the same
//! trait, so callers are transport-agnostic.

use crate::api::{
    AnswerResponse, EncodingVector, GenerationOptions, GenerationResponse, PoolingStrategy,
    QuestionAnsweringOptions, TextClassificationParameters, TextClassificationResponse,
    TokenClassificationParameters, TokenClassificationResponse, ZeroShotParameters,
    ZeroShotResponse,
};
use crate::error::Result;
use async_trait::async_trait;

/// Maps a text to one dense vector.
#[async_trait]
pub trait TextEncoding: Send + Sync {
    /// Encode `text` and pool the per-token vectors with `pooling`.
    ///
    /// Returns exactly one vector whose length is the model's hidden size.
    async fn encode(&self, text: &str, pooling: PoolingStrategy) -> Result<EncodingVector>;
}

/// Labels the tokens of a text and aggregates them into entities.
#[async_trait]
pub trait TokenClassification: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        parameters: &TokenClassificationParameters,
    ) -> Result<TokenClassificationResponse>;
}

/// Scores a text against the model's fixed label set.
#[async_trait]
pub trait TextClassification: Send + Sync {
    /// Returns every label (or the best `top_k`) with its softmax probability,
    /// best first.
    async fn classify(
        &self,
        text: &str,
        parameters: &TextClassificationParameters,
    ) -> Result<TextClassificationResponse>;
}

/// Extracts answer spans for a question from a passage.
#[async_trait]
pub trait QuestionAnswering: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        passage: &str,
        options: &QuestionAnsweringOptions,
    ) -> Result<AnswerResponse>;
}

/// Scores arbitrary candidate labels for a text through entailment.
#[async_trait]
pub trait ZeroShotClassification: Send + Sync {
    async fn classify(&self, text: &str, parameters: &ZeroShotParameters)
    -> Result<ZeroShotResponse>;
}

/// Generates text conditioned on an input text.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(&self, text: &str, options: &GenerationOptions)
    -> Result<GenerationResponse>;
}
