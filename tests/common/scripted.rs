//! Deterministic backends whose outputs are a function of the token strings,
//! so task decoding can be checked end to end without model weights.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uni_tasks::api::GenerationOptions;
use uni_tasks::backend::{
    BackendLoader, EncoderBackend, GeneratedSequence, GenerationBackend, SequenceClassifierBackend,
    SpanClassifierBackend, SpanLogits, TokenClassifierBackend,
};
use uni_tasks::error::Result;
use uni_tasks::model_dir::ModelDirectory;
use uni_tasks::tokenizer::TokenizedInput;

const CONFIDENT: f32 = 5.0;

fn one_hot(len: usize, index: usize) -> Vec<f32> {
    let mut row = vec![0.0; len];
    if let Some(slot) = row.get_mut(index) {
        *slot = CONFIDENT;
    }
    row
}

/// Loader handing out the scripted heads below.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every forward pass sleep for `delay` first.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Forward passes run so far, across every head built by this loader.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Forward passes that ran to the end of their delay.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    async fn forward(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl BackendLoader for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn encoder(&self, dir: &ModelDirectory) -> Result<Arc<dyn EncoderBackend>> {
        Ok(Arc::new(IdEncoder {
            script: self.clone(),
            dim: dir.config().hidden_size,
        }))
    }

    fn token_classifier(
        &self,
        _dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn TokenClassifierBackend>> {
        Ok(Arc::new(VerbTagger {
            script: self.clone(),
            num_labels,
        }))
    }

    fn span_classifier(&self, _dir: &ModelDirectory) -> Result<Arc<dyn SpanClassifierBackend>> {
        Ok(Arc::new(NameSpanner {
            script: self.clone(),
        }))
    }

    fn sequence_classifier(
        &self,
        _dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn SequenceClassifierBackend>> {
        Ok(Arc::new(SportsEntailment {
            script: self.clone(),
            num_labels,
        }))
    }

    fn generator(&self, _dir: &ModelDirectory) -> Result<Arc<dyn GenerationBackend>> {
        Ok(Arc::new(EchoGenerator {
            script: self.clone(),
        }))
    }
}

/// Every position's vector is its token id repeated `dim` times.
struct IdEncoder {
    script: ScriptedBackend,
    dim: usize,
}

#[async_trait]
impl EncoderBackend for IdEncoder {
    async fn encode(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>> {
        self.script.forward().await;
        Ok(input
            .ids
            .iter()
            .map(|&id| vec![id as f32; self.dim])
            .collect())
    }
}

/// Tags `play` as `B-VERB` (index 1) and its continuations as `I-VERB`
/// (index 2). Everything else is `O`.
struct VerbTagger {
    script: ScriptedBackend,
    num_labels: usize,
}

#[async_trait]
impl TokenClassifierBackend for VerbTagger {
    async fn classify_tokens(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>> {
        self.script.forward().await;
        let mut in_verb = false;
        Ok(input
            .tokens
            .iter()
            .map(|token| {
                let label = if token.text == "play" {
                    in_verb = true;
                    1
                } else if in_verb && token.text.starts_with("##") {
                    2
                } else {
                    in_verb = false;
                    0
                };
                one_hot(self.num_labels, label)
            })
            .collect())
    }
}

/// Points start at `jane` and end at `austen` in the passage segment.
struct NameSpanner {
    script: ScriptedBackend,
}

#[async_trait]
impl SpanClassifierBackend for NameSpanner {
    async fn span_logits(&self, input: &TokenizedInput) -> Result<SpanLogits> {
        self.script.forward().await;
        let mut start = vec![0.0; input.len()];
        let mut end = vec![0.0; input.len()];
        for (i, (token, segment)) in input.tokens.iter().zip(&input.type_ids).enumerate() {
            if *segment != 1 {
                continue;
            }
            match token.text.as_str() {
                "jane" => start[i] = 8.0,
                "austen" => end[i] = 8.0,
                _ => {}
            }
        }
        Ok(SpanLogits { start, end })
    }
}

/// Puts the last class on any sequence mentioning `sports`, the first class
/// on the rest. For pairs only the hypothesis segment is inspected, so NLI
/// logits read as `[contradiction, neutral, entailment]`.
struct SportsEntailment {
    script: ScriptedBackend,
    num_labels: usize,
}

#[async_trait]
impl SequenceClassifierBackend for SportsEntailment {
    async fn classify_sequence(&self, input: &TokenizedInput) -> Result<Vec<f32>> {
        self.script.forward().await;
        let segment = u32::from(input.type_ids.contains(&1));
        let entailed = input
            .tokens
            .iter()
            .zip(&input.type_ids)
            .any(|(token, s)| *s == segment && token.text == "sports");
        let mut logits = vec![0.0; self.num_labels];
        let (contradiction, entailment) = if entailed { (-3.0, 3.0) } else { (3.0, -3.0) };
        logits[0] = contradiction;
        logits[self.num_labels - 1] = entailment;
        Ok(logits)
    }
}

/// Returns the source ids as every hypothesis.
struct EchoGenerator {
    script: ScriptedBackend,
}

#[async_trait]
impl GenerationBackend for EchoGenerator {
    async fn generate(
        &self,
        input_ids: &[u32],
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedSequence>> {
        self.script.forward().await;
        let count = options.num_return_sequences.unwrap_or(1);
        Ok((0..count)
            .map(|i| GeneratedSequence {
                ids: input_ids.to_vec(),
                score: -(i as f64),
            })
            .collect())
    }
}
