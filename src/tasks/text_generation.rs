use super::check_length;
use crate::api::{GenerationOptions, GenerationResponse};
use crate::backend::{BackendLoader, GenerationBackend};
use crate::error::Result;
use crate::model_dir::ModelDirectory;
use crate::options_validation::validate_generation_options;
use crate::tokenizer::sentencepiece::DEFAULT_EOS_TOKEN;
use crate::tokenizer::{SentencePieceTokenizer, Tokenizer};
use crate::traits::TextGeneration;
use async_trait::async_trait;
use std::sync::Arc;

/// Encoder-decoder text generation (translation, summarization) over a
/// SentencePiece vocabulary.
pub struct SentencePieceTextGeneration {
    tokenizer: SentencePieceTokenizer,
    backend: Arc<dyn GenerationBackend>,
    max_length: usize,
}

impl SentencePieceTextGeneration {
    pub fn new(
        tokenizer: SentencePieceTokenizer,
        backend: Arc<dyn GenerationBackend>,
        max_length: usize,
    ) -> Self {
        Self {
            tokenizer,
            backend,
            max_length,
        }
    }

    pub fn load(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<Self> {
        let tokenizer =
            SentencePieceTokenizer::from_model_dir(dir.path(), dir.tokenizer_config().do_lower_case)?;
        Ok(Self::new(
            tokenizer,
            loader.generator(dir)?,
            dir.config().max_position_embeddings,
        ))
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let pieces: Vec<String> = self
            .tokenizer
            .strings_of(ids)?
            .into_iter()
            .filter(|p| !self.tokenizer.is_special_piece(p))
            .collect();
        Ok(self.tokenizer.detokenize(&pieces))
    }
}

#[async_trait]
impl TextGeneration for SentencePieceTextGeneration {
    async fn generate(
        &self,
        text: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        validate_generation_options(options)?;
        let tokens = self.tokenizer.tokenize(text);
        let mut ids = self.tokenizer.ids_of(&tokens)?;
        if let Some(eos) = self.tokenizer.vocabulary().get_id(DEFAULT_EOS_TOKEN) {
            ids.push(eos);
        }
        check_length(ids.len(), self.max_length)?;

        let sequences = self.backend.generate(&ids, options).await?;

        tracing::debug_span!("detokenize", sequences = sequences.len()).in_scope(|| {
            let mut response = GenerationResponse::default();
            for sequence in sequences {
                response.texts.push(self.decode(&sequence.ids)?);
                response.scores.push(sequence.score);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::mock::{MockGenerator, sentencepiece_tokenizer};

    #[tokio::test]
    async fn echo_generation_round_trips_text() {
        let backend = Arc::new(MockGenerator::echo());
        let task = SentencePieceTextGeneration::new(sentencepiece_tokenizer(), backend.clone(), 64);
        let response = task
            .generate("hello world", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(response.texts, vec!["hello world"]);
        assert_eq!(response.scores.len(), 1);
        // The input handed to the backend ends with </s>.
        let seen = backend.last_input();
        let eos = sentencepiece_tokenizer()
            .vocabulary()
            .get_id(DEFAULT_EOS_TOKEN)
            .unwrap();
        assert_eq!(seen.last(), Some(&eos));
    }

    #[tokio::test]
    async fn too_long_input_is_rejected() {
        let backend = Arc::new(MockGenerator::echo());
        let task = SentencePieceTextGeneration::new(sentencepiece_tokenizer(), backend, 2);
        let err = task
            .generate("hello world", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InputTooLong { length: 3, max: 2 }));
    }

    #[tokio::test]
    async fn out_of_vocabulary_id_is_invariant_violation() {
        let backend = Arc::new(MockGenerator::fixed(vec![9999]));
        let task = SentencePieceTextGeneration::new(sentencepiece_tokenizer(), backend, 64);
        let err = task
            .generate("hello", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::VocabularyInvariant(_)));
    }
}
