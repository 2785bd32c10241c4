#![allow(dead_code)]

//! Mock implementations for testing
//!
//! Scripted backends, a backend loader that hands them out, and small
//! tokenizers over fixed vocabularies. All types are gated with
//! `#[cfg(test)]`.

use crate::api::GenerationOptions;
use crate::backend::{
    BackendLoader, EncoderBackend, GeneratedSequence, GenerationBackend,
    SequenceClassifierBackend, SpanClassifierBackend, SpanLogits, TokenClassifierBackend,
};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::tokenizer::spm_model::{PieceType, SentencePiece};
use crate::tokenizer::{SentencePieceTokenizer, TokenizedInput, WordPieceTokenizer};
use crate::vocabulary::Vocabulary;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const WORDPIECE_VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "play", "##ing", "##ed", "the", "game", ",",
];

pub fn wordpiece_tokenizer() -> WordPieceTokenizer {
    WordPieceTokenizer::new(Vocabulary::from_tokens(WORDPIECE_VOCAB.iter().copied(), "[UNK]").unwrap())
}

pub fn sentencepiece_pieces() -> Vec<SentencePiece> {
    vec![
        SentencePiece::new("<pad>", 0.0, PieceType::Control),
        SentencePiece::new("</s>", 0.0, PieceType::Control),
        SentencePiece::new("<unk>", 0.0, PieceType::Unknown),
        SentencePiece::new("▁", -3.0, PieceType::Normal),
        SentencePiece::new("▁hello", -1.0, PieceType::Normal),
        SentencePiece::new("▁world", -1.0, PieceType::Normal),
        SentencePiece::new("s", -2.0, PieceType::Normal),
    ]
}

pub fn sentencepiece_tokenizer() -> SentencePieceTokenizer {
    let pieces = sentencepiece_pieces();
    let vocab =
        Vocabulary::from_tokens(pieces.iter().map(|p| p.piece.clone()), "<unk>").unwrap();
    SentencePieceTokenizer::new(vocab, &pieces, false)
}

/// Logits with a clear winner at `index`.
pub fn one_hot(len: usize, index: usize) -> Vec<f32> {
    let mut v = vec![0.0; len];
    v[index] = 5.0;
    v
}

/// Encoder returning `dim`-sized vectors derived from each input id.
pub struct MockEncoder {
    dim: usize,
    call_count: AtomicU32,
}

impl MockEncoder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncoderBackend for MockEncoder {
    async fn encode(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(input
            .ids
            .iter()
            .map(|&id| (0..self.dim).map(|j| id as f32 + j as f32).collect())
            .collect())
    }
}

/// Token classifier returning the same scripted rows for every call.
pub struct MockTokenClassifier {
    rows: Vec<Vec<f32>>,
    call_count: AtomicU32,
}

impl MockTokenClassifier {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self {
            rows,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenClassifierBackend for MockTokenClassifier {
    async fn classify_tokens(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.iter().take(input.len()).cloned().collect())
    }
}

pub struct MockSpanClassifier {
    logits: SpanLogits,
    call_count: AtomicU32,
}

impl MockSpanClassifier {
    pub fn new(logits: SpanLogits) -> Self {
        Self {
            logits,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpanClassifierBackend for MockSpanClassifier {
    async fn span_logits(&self, _input: &TokenizedInput) -> Result<SpanLogits> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.logits.clone())
    }
}

/// Sequence classifier returning scripted rows in call order, cycling.
pub struct MockSequenceClassifier {
    rows: Vec<Vec<f32>>,
    next: AtomicUsize,
}

impl MockSequenceClassifier {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self {
            rows,
            next: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequenceClassifierBackend for MockSequenceClassifier {
    async fn classify_sequence(&self, _input: &TokenizedInput) -> Result<Vec<f32>> {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        if self.rows.is_empty() {
            return Err(TaskError::Inference("Mock classifier has no rows".to_string()));
        }
        Ok(self.rows[i % self.rows.len()].clone())
    }
}

/// Generator that echoes its input or returns fixed ids.
pub struct MockGenerator {
    fixed: Option<Vec<u32>>,
    last_input: Mutex<Vec<u32>>,
}

impl MockGenerator {
    pub fn echo() -> Self {
        Self {
            fixed: None,
            last_input: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(ids: Vec<u32>) -> Self {
        Self {
            fixed: Some(ids),
            last_input: Mutex::new(Vec::new()),
        }
    }

    pub fn last_input(&self) -> Vec<u32> {
        self.last_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerator {
    async fn generate(
        &self,
        input_ids: &[u32],
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedSequence>> {
        *self.last_input.lock().unwrap() = input_ids.to_vec();
        let ids = self.fixed.clone().unwrap_or_else(|| input_ids.to_vec());
        let n = options.num_return_sequences.unwrap_or(1);
        Ok((0..n)
            .map(|i| GeneratedSequence {
                ids: ids.clone(),
                score: -(i as f64),
            })
            .collect())
    }
}

/// Loader handing out mock backends, sized from the model directory.
#[derive(Default)]
pub struct MockBackendLoader;

impl BackendLoader for MockBackendLoader {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn encoder(&self, dir: &ModelDirectory) -> Result<Arc<dyn EncoderBackend>> {
        Ok(Arc::new(MockEncoder::new(dir.config().hidden_size)))
    }

    fn token_classifier(
        &self,
        _dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn TokenClassifierBackend>> {
        Ok(Arc::new(MockTokenClassifier::new(vec![one_hot(num_labels, 0); 512])))
    }

    fn span_classifier(&self, _dir: &ModelDirectory) -> Result<Arc<dyn SpanClassifierBackend>> {
        Ok(Arc::new(MockSpanClassifier::new(SpanLogits::default())))
    }

    fn sequence_classifier(
        &self,
        _dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn SequenceClassifierBackend>> {
        Ok(Arc::new(MockSequenceClassifier::new(vec![vec![0.0; num_labels]])))
    }

    fn generator(&self, _dir: &ModelDirectory) -> Result<Arc<dyn GenerationBackend>> {
        Ok(Arc::new(MockGenerator::echo()))
    }
}
