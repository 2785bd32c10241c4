use super::{check_length, load_wordpiece, normalize};
use crate::aggregation::softmax;
use crate::api::{ClassificationResult, TextClassificationParameters, TextClassificationResponse};
use crate::backend::{BackendLoader, SequenceClassifierBackend};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::options_validation::validate_text_classification_parameters;
use crate::tokenizer::wordpiece::{DEFAULT_CLASS_TOKEN, DEFAULT_SEQUENCE_SEPARATOR};
use crate::tokenizer::{TokenizedInput, Tokenizer, WordPieceTokenizer};
use crate::traits::TextClassification;
use async_trait::async_trait;
use std::sync::Arc;

/// BERT-family sequence classifier (sentiment, topic, ...).
///
/// The text is scored once as `[CLS] text [SEP]` and the logits are
/// normalized over the `id2label` classes.
pub struct BertTextClassification {
    tokenizer: WordPieceTokenizer,
    backend: Arc<dyn SequenceClassifierBackend>,
    labels: Vec<String>,
    do_lower_case: bool,
    max_length: usize,
}

impl BertTextClassification {
    pub fn new(
        tokenizer: WordPieceTokenizer,
        backend: Arc<dyn SequenceClassifierBackend>,
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
        let backend = loader.sequence_classifier(dir, labels.len())?;
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

    fn single(&self, text: &str) -> Result<TokenizedInput> {
        let vocab = self.tokenizer.vocabulary();
        let tokens = self.tokenizer.tokenize(&normalize(text, self.do_lower_case));
        let mut input = TokenizedInput::new();
        input.push_special(vocab, DEFAULT_CLASS_TOKEN, 0, 0)?;
        input.extend(vocab, tokens, 0)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, text.len(), 0)?;
        check_length(input.len(), self.max_length)?;
        Ok(input)
    }
}

#[async_trait]
impl TextClassification for BertTextClassification {
    async fn classify(
        &self,
        text: &str,
        parameters: &TextClassificationParameters,
    ) -> Result<TextClassificationResponse> {
        validate_text_classification_parameters(parameters)?;
        let input = self.single(text)?;
        let logits = self.backend.classify_sequence(&input).await?;
        if logits.len() != self.labels.len() {
            return Err(TaskError::Inference(format!(
                "sequence classifier returned {} logits for {} labels",
                logits.len(),
                self.labels.len()
            )));
        }

        let classes = tracing::debug_span!("classes", labels = self.labels.len()).in_scope(|| {
            let mut classes: Vec<ClassificationResult> = self
                .labels
                .iter()
                .zip(softmax(&logits))
                .map(|(label, score)| ClassificationResult {
                    label: label.clone(),
                    score,
                })
                .collect();
            classes.sort_by(|a, b| b.score.total_cmp(&a.score));
            if let Some(k) = parameters.top_k {
                classes.truncate(k);
            }
            classes
        });
        Ok(TextClassificationResponse { classes })
    }
}
