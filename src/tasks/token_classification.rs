use super::{check_length, load_wordpiece, normalize};
use crate::aggregation::{LabeledToken, aggregate_none, aggregate_simple, argmax, softmax};
use crate::api::{AggregationStrategy, TokenClassificationParameters, TokenClassificationResponse};
use crate::backend::{BackendLoader, TokenClassifierBackend, check_rows};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::tokenizer::wordpiece::{DEFAULT_CLASS_TOKEN, DEFAULT_SEQUENCE_SEPARATOR};
use crate::tokenizer::{Token, TokenizedInput, Tokenizer, WordPieceTokenizer};
use crate::traits::TokenClassification;
use async_trait::async_trait;
use std::sync::Arc;

/// BERT-family token classifier (NER, POS tagging, ...).
///
/// Each non-special token gets `softmax` + `argmax` over the label logits.
/// Sub-tokens are grouped into words through the `##` marker before the
/// aggregation strategy is applied.
pub struct BertTokenClassification {
    tokenizer: WordPieceTokenizer,
    backend: Arc<dyn TokenClassifierBackend>,
    labels: Vec<String>,
    do_lower_case: bool,
    max_length: usize,
}

impl BertTokenClassification {
    pub fn new(
        tokenizer: WordPieceTokenizer,
        backend: Arc<dyn TokenClassifierBackend>,
        labels: Vec<String>,
        do_lower_case: bool,
        max_length: usize,
    ) -> Self {
        Self {
            tokenizer,
            backend,
            labels,
            do_lower_case,
            max_length,
        }
    }

    pub fn load(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<Self> {
        let labels = dir.config().labels()?;
        let backend = loader.token_classifier(dir, labels.len())?;
        Ok(Self::new(
            load_wordpiece(dir)?,
            backend,
            labels,
            dir.tokenizer_config().do_lower_case,
            dir.config().max_position_embeddings,
        ))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Surround the tokens with `[CLS]`/`[SEP]` for the backend call only.
    fn pad(&self, tokens: &[Token], text_len: usize) -> Result<TokenizedInput> {
        let vocab = self.tokenizer.vocabulary();
        let mut input = TokenizedInput::new();
        input.push_special(vocab, DEFAULT_CLASS_TOKEN, 0, 0)?;
        input.extend(vocab, tokens.to_vec(), 0)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, text_len, 0)?;
        Ok(input)
    }

    fn best_class(&self, logits: &[f32]) -> Result<(String, f64)> {
        let probs = softmax(logits);
        let (index, score) = argmax(&probs)
            .ok_or_else(|| TaskError::Inference("empty label distribution".to_string()))?;
        let label = self.labels.get(index).ok_or_else(|| {
            TaskError::Inference(format!(
                "predicted class {} but the model has {} labels",
                index,
                self.labels.len()
            ))
        })?;
        Ok((label.clone(), score))
    }
}

#[async_trait]
impl TokenClassification for BertTokenClassification {
    async fn classify(
        &self,
        text: &str,
        parameters: &TokenClassificationParameters,
    ) -> Result<TokenClassificationResponse> {
        let tokens = self.tokenizer.tokenize(&normalize(text, self.do_lower_case));
        if tokens.is_empty() {
            return Ok(TokenClassificationResponse::default());
        }
        check_length(tokens.len(), self.max_length)?;

        let input = self.pad(&tokens, text.len())?;
        let logits = self.backend.classify_tokens(&input).await?;

        let strategy = parameters.aggregation_strategy;
        tracing::debug_span!("aggregate", tokens = tokens.len(), ?strategy).in_scope(|| {
            check_rows(&logits, input.len(), "token classifier")?;
            let labeled = tokens
                .iter()
                .zip(&logits[1..])
                .map(|(token, row)| {
                    let (label, score) = self.best_class(row)?;
                    Ok(LabeledToken {
                        start: token.start,
                        end: token.end,
                        label,
                        score,
                        continuation: WordPieceTokenizer::is_continuation(&token.text),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let entities = match strategy {
                AggregationStrategy::None => aggregate_none(text, &labeled)?,
                AggregationStrategy::Simple => aggregate_simple(text, &labeled)?,
            };
            Ok(TokenClassificationResponse { entities })
        })
    }
}
