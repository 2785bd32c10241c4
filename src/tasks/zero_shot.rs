use super::{check_length, load_wordpiece, normalize};
use crate::aggregation::softmax;
use crate::api::{ClassificationResult, ZeroShotParameters, ZeroShotResponse};
use crate::backend::{BackendLoader, SequenceClassifierBackend};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::options_validation::validate_zero_shot_parameters;
use crate::tokenizer::wordpiece::{DEFAULT_CLASS_TOKEN, DEFAULT_SEQUENCE_SEPARATOR};
use crate::tokenizer::{Token, TokenizedInput, Tokenizer, WordPieceTokenizer};
use crate::traits::ZeroShotClassification;
use async_trait::async_trait;
use std::sync::Arc;

/// Positions of the NLI classes in the model's label list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntailmentClasses {
    pub entailment: usize,
    pub contradiction: Option<usize>,
    pub num_labels: usize,
}

impl EntailmentClasses {
    /// Locate the classes by case-insensitive prefix (`entail`, `contradict`).
    pub fn from_labels(labels: &[String]) -> Result<Self> {
        let find = |prefix: &str| {
            labels
                .iter()
                .position(|l| l.to_lowercase().starts_with(prefix))
        };
        let entailment = find("entail").ok_or_else(|| {
            TaskError::Config(format!(
                "No entailment class in id2label {:?}; not an NLI model",
                labels
            ))
        })?;
        Ok(Self {
            entailment,
            contradiction: find("contradict"),
            num_labels: labels.len(),
        })
    }
}

/// Zero-shot classification through an NLI sequence classifier.
///
/// Each candidate label is turned into a hypothesis and scored against the
/// text (the premise) as `[CLS] premise [SEP] hypothesis [SEP]`.
pub struct BertZeroShotClassification {
    tokenizer: WordPieceTokenizer,
    backend: Arc<dyn SequenceClassifierBackend>,
    classes: EntailmentClasses,
    do_lower_case: bool,
    max_length: usize,
}

impl BertZeroShotClassification {
    pub fn new(
        tokenizer: WordPieceTokenizer,
        backend: Arc<dyn SequenceClassifierBackend>,
        classes: EntailmentClasses,
        do_lower_case: bool,
        max_length: usize,
    ) -> Self {
        Self {
            tokenizer,
            backend,
            classes,
            do_lower_case,
            max_length,
        }
    }

    pub fn load(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<Self> {
        let labels = dir.config().labels()?;
        let classes = EntailmentClasses::from_labels(&labels)?;
        Ok(Self::new(
            load_wordpiece(dir)?,
            loader.sequence_classifier(dir, labels.len())?,
            classes,
            dir.tokenizer_config().do_lower_case,
            dir.config().max_position_embeddings,
        ))
    }

    fn pair(&self, premise: &[Token], premise_len: usize, hypothesis: &str) -> Result<TokenizedInput> {
        let vocab = self.tokenizer.vocabulary();
        let hypothesis_tokens = self
            .tokenizer
            .tokenize(&normalize(hypothesis, self.do_lower_case));
        let mut input = TokenizedInput::new();
        input.push_special(vocab, DEFAULT_CLASS_TOKEN, 0, 0)?;
        input.extend(vocab, premise.to_vec(), 0)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, premise_len, 0)?;
        input.extend(vocab, hypothesis_tokens, 1)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, hypothesis.len(), 1)?;
        check_length(input.len(), self.max_length)?;
        Ok(input)
    }

    fn score(&self, per_label_logits: &[Vec<f32>], multi_label: bool) -> Vec<f64> {
        let entail = self.classes.entailment;
        if !multi_label {
            let entailment: Vec<f32> = per_label_logits.iter().map(|l| l[entail]).collect();
            return softmax(&entailment);
        }
        per_label_logits
            .iter()
            .map(|logits| match self.classes.contradiction {
                Some(contra) => softmax(&[logits[contra], logits[entail]])[1],
                None => softmax(logits)[entail],
            })
            .collect()
    }
}

#[async_trait]
impl ZeroShotClassification for BertZeroShotClassification {
    async fn classify(
        &self,
        text: &str,
        parameters: &ZeroShotParameters,
    ) -> Result<ZeroShotResponse> {
        validate_zero_shot_parameters(parameters)?;
        let premise = self.tokenizer.tokenize(&normalize(text, self.do_lower_case));

        let mut per_label_logits = Vec::with_capacity(parameters.candidate_labels.len());
        for label in &parameters.candidate_labels {
            let hypothesis = parameters.template().replace("{}", label);
            let input = self.pair(&premise, text.len(), &hypothesis)?;
            let logits = self.backend.classify_sequence(&input).await?;
            if logits.len() != self.classes.num_labels {
                return Err(TaskError::Inference(format!(
                    "sequence classifier returned {} logits for {} classes",
                    logits.len(),
                    self.classes.num_labels
                )));
            }
            per_label_logits.push(logits);
        }

        let multi_label = parameters.multi_label;
        let classes = tracing::debug_span!("entailment", labels = per_label_logits.len(), multi_label)
            .in_scope(|| {
                let scores = self.score(&per_label_logits, multi_label);
                let mut classes: Vec<ClassificationResult> = parameters
                    .candidate_labels
                    .iter()
                    .zip(scores)
                    .map(|(label, score)| ClassificationResult {
                        label: label.clone(),
                        score,
                    })
                    .collect();
                classes.sort_by(|a, b| b.score.total_cmp(&a.score));
                classes
            });
        Ok(ZeroShotResponse { classes })
    }
}
