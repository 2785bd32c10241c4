use super::{check_length, load_wordpiece, normalize};
use crate::aggregation::{SpanLimits, select_spans};
use crate::api::{Answer, AnswerResponse, QuestionAnsweringOptions};
use crate::backend::{BackendLoader, SpanClassifierBackend, check_rows};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::options_validation::validate_qa_options;
use crate::tokenizer::wordpiece::{DEFAULT_CLASS_TOKEN, DEFAULT_SEQUENCE_SEPARATOR};
use crate::tokenizer::{TokenizedInput, Tokenizer, WordPieceTokenizer};
use crate::traits::QuestionAnswering;
use async_trait::async_trait;
use std::sync::Arc;

/// Extractive question answering over `[CLS] question [SEP] passage [SEP]`.
pub struct BertQuestionAnswering {
    tokenizer: WordPieceTokenizer,
    backend: Arc<dyn SpanClassifierBackend>,
    do_lower_case: bool,
    max_length: usize,
}

impl BertQuestionAnswering {
    pub fn new(
        tokenizer: WordPieceTokenizer,
        backend: Arc<dyn SpanClassifierBackend>,
        do_lower_case: bool,
        max_length: usize,
    ) -> Self {
        Self {
            tokenizer,
            backend,
            do_lower_case,
            max_length,
        }
    }

    pub fn load(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<Self> {
        Ok(Self::new(
            load_wordpiece(dir)?,
            loader.span_classifier(dir)?,
            dir.tokenizer_config().do_lower_case,
            dir.config().max_position_embeddings,
        ))
    }
}

#[async_trait]
impl QuestionAnswering for BertQuestionAnswering {
    async fn answer(
        &self,
        question: &str,
        passage: &str,
        options: &QuestionAnsweringOptions,
    ) -> Result<AnswerResponse> {
        validate_qa_options(options)?;
        let options = options.resolved();

        let vocab = self.tokenizer.vocabulary();
        let question_tokens = self
            .tokenizer
            .tokenize(&normalize(question, self.do_lower_case));
        let passage_tokens = self
            .tokenizer
            .tokenize(&normalize(passage, self.do_lower_case));
        if passage_tokens.is_empty() {
            return Ok(AnswerResponse::default());
        }

        let mut input = TokenizedInput::new();
        input.push_special(vocab, DEFAULT_CLASS_TOKEN, 0, 0)?;
        input.extend(vocab, question_tokens, 0)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, question.len(), 0)?;
        let passage_offset = input.len();
        input.extend(vocab, passage_tokens.clone(), 1)?;
        input.push_special(vocab, DEFAULT_SEQUENCE_SEPARATOR, passage.len(), 1)?;
        check_length(input.len(), self.max_length)?;

        let logits = self.backend.span_logits(&input).await?;

        let passage_range = passage_offset..passage_offset + passage_tokens.len();
        tracing::debug_span!("select_spans", candidates = options.max_candidates).in_scope(|| {
            check_rows(&logits.start, input.len(), "span classifier (start)")?;
            check_rows(&logits.end, input.len(), "span classifier (end)")?;
            let spans = select_spans(
                &logits.start,
                &logits.end,
                passage_range,
                SpanLimits {
                    max_answers: options.max_answers,
                    max_answer_length: options.max_answer_length,
                    max_candidates: options.max_candidates,
                    min_score: options.min_score,
                },
            )?;
            let answers = spans
                .into_iter()
                .map(|span| {
                    let start = passage_tokens[span.start - passage_offset].start;
                    let end = passage_tokens[span.end - passage_offset].end;
                    let text = passage.get(start..end).ok_or_else(|| {
                        TaskError::Inference(format!("answer span {}..{} is not valid", start, end))
                    })?;
                    Ok(Answer {
                        text: text.to_string(),
                        start,
                        end,
                        score: span.score,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(AnswerResponse { answers })
        })
    }
}
