use super::{check_length, load_wordpiece, normalize};
use crate::aggregation::pool;
use crate::api::{EncodingVector, PoolingStrategy};
use crate::backend::{BackendLoader, EncoderBackend, check_rows};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::tokenizer::wordpiece::{DEFAULT_CLASS_TOKEN, DEFAULT_SEQUENCE_SEPARATOR};
use crate::tokenizer::{TokenizedInput, Tokenizer, WordPieceTokenizer};
use crate::traits::TextEncoding;
use async_trait::async_trait;
use std::sync::Arc;

/// BERT-family text encoder: `[CLS] tokens [SEP]` through an encoder, then
/// pooled to a single vector.
pub struct BertTextEncoding {
    tokenizer: WordPieceTokenizer,
    backend: Arc<dyn EncoderBackend>,
    do_lower_case: bool,
    max_length: usize,
    hidden_size: usize,
}

impl BertTextEncoding {
    pub fn new(
        tokenizer: WordPieceTokenizer,
        backend: Arc<dyn EncoderBackend>,
        do_lower_case: bool,
        max_length: usize,
        hidden_size: usize,
    ) -> Self {
        Self {
            tokenizer,
            backend,
            do_lower_case,
            max_length,
            hidden_size,
        }
    }

    pub fn load(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<Self> {
        Ok(Self::new(
            load_wordpiece(dir)?,
            loader.encoder(dir)?,
            dir.tokenizer_config().do_lower_case,
            dir.config().max_position_embeddings,
            dir.config().hidden_size,
        ))
    }

    fn tokenize(&self, text: &str) -> Result<TokenizedInput> {
        let normalized = normalize(text, self.do_lower_case);
        let vocab = self.tokenizer.vocabulary();
        let mut input = TokenizedInput::new();
        input.push_special(vocab, DEFAULT_CLASS_TOKEN, 0, 0)?;
        input.extend(vocab, self.tokenizer.tokenize(&normalized), 0)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, text.len(), 0)?;
        Ok(input)
    }
}

#[async_trait]
impl TextEncoding for BertTextEncoding {
    async fn encode(&self, text: &str, pooling: PoolingStrategy) -> Result<EncodingVector> {
        let input = self.tokenize(text)?;
        check_length(input.len(), self.max_length)?;

        let vectors = self.backend.encode(&input).await?;

        tracing::debug_span!("pool", tokens = input.len(), ?pooling).in_scope(|| {
            check_rows(&vectors, input.len(), "encoder")?;
            let special: Vec<bool> = input.tokens.iter().map(|t| t.is_special).collect();
            let vector = pool(&vectors, &special, pooling)?;
            if vector.len() != self.hidden_size {
                return Err(TaskError::Inference(format!(
                    "encoder produced {} dimensions, model hidden size is {}",
                    vector.len(),
                    self.hidden_size
                )));
            }
            Ok(EncodingVector { vector, pooling })
        })
    }
}
