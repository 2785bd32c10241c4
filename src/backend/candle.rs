use super::{
    BackendLoader, EncoderBackend, GeneratedSequence, GenerationBackend,
    SequenceClassifierBackend, SpanClassifierBackend, SpanLogits, TokenClassifierBackend,
};
use crate::api::GenerationOptions;
use crate::error::{Result, TaskError};
use crate::model_dir::{ModelDirectory, WEIGHTS_FILE};
use crate::tokenizer::TokenizedInput;
use async_trait::async_trait;
use candle_core::{Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use candle_transformers::models::marian::{Config as MarianConfig, MTModel};
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_MAX_GENERATED: usize = 256;
const SAMPLING_SEED: u64 = 299792458;

fn inference(e: candle_core::Error) -> TaskError {
    TaskError::Inference(e.to_string())
}

fn load_err(e: candle_core::Error) -> TaskError {
    TaskError::Config(format!("Failed to load weights: {}", e))
}

/// Builds backends on top of [Candle](https://github.com/huggingface/candle)
/// from `model.safetensors` in the model directory.
///
/// BERT-family encoders serve every encoder head; `marian` serves generation.
/// Weights are memory-mapped on CPU, or on the first CUDA device when the
/// `gpu-cuda` feature is enabled.
#[derive(Default)]
pub struct CandleBackendLoader;

impl CandleBackendLoader {
    pub fn new() -> Self {
        Self
    }

    fn device() -> Device {
        let device = if cfg!(feature = "gpu-cuda") {
            Device::cuda_if_available(0).unwrap_or(Device::Cpu)
        } else {
            Device::Cpu
        };
        tracing::debug!(cuda = device.is_cuda(), "Selected candle device");
        device
    }

    fn var_builder(dir: &ModelDirectory, device: &Device) -> Result<VarBuilder<'static>> {
        let weights = dir.require_file(WEIGHTS_FILE)?;
        // SAFETY: the weights file is not modified while mapped.
        unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DTYPE, device) }
            .map_err(load_err)
    }

    fn bert(&self, dir: &ModelDirectory) -> Result<LoadedBert> {
        let config: BertConfig = serde_json::from_str(dir.config_json())
            .map_err(|e| TaskError::Config(format!("Unsupported BERT config: {}", e)))?;
        let device = Self::device();
        let vb = Self::var_builder(dir, &device)?;
        let model = BertModel::load(vb.clone(), &config).map_err(load_err)?;
        tracing::info!(
            path = %dir.path().display(),
            model_type = dir.model_type(),
            "Candle BERT encoder loaded"
        );
        Ok(LoadedBert {
            model,
            vb,
            device,
            model_type: dir.model_type().to_string(),
            hidden_size: dir.config().hidden_size,
        })
    }
}

struct LoadedBert {
    model: BertModel,
    vb: VarBuilder<'static>,
    device: Device,
    model_type: String,
    hidden_size: usize,
}

impl LoadedBert {
    /// Load a linear head at `name`, falling back to `{model_type}.{name}`.
    fn head(&self, name: &str, out: usize) -> Result<Linear> {
        candle_nn::linear(self.hidden_size, out, self.vb.pp(name))
            .or_else(|_| {
                candle_nn::linear(
                    self.hidden_size,
                    out,
                    self.vb.pp(format!("{}.{}", self.model_type, name)),
                )
            })
            .map_err(load_err)
    }

    fn pooler(&self) -> Result<Linear> {
        self.head("pooler.dense", self.hidden_size)
    }

    /// Run the encoder; returns a `(seq, hidden)` tensor.
    fn hidden_states(&self, input: &TokenizedInput) -> Result<Tensor> {
        let ids = Tensor::new(input.ids.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference)?;
        let type_ids = Tensor::new(input.type_ids.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference)?;
        let mask = ids.ones_like().map_err(inference)?;
        self.model
            .forward(&ids, &type_ids, Some(&mask))
            .and_then(|t| t.squeeze(0))
            .map_err(inference)
    }
}

impl BackendLoader for CandleBackendLoader {
    fn name(&self) -> &'static str {
        "candle"
    }

    fn encoder(&self, dir: &ModelDirectory) -> Result<Arc<dyn EncoderBackend>> {
        Ok(Arc::new(CandleEncoder { bert: self.bert(dir)? }))
    }

    fn token_classifier(
        &self,
        dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn TokenClassifierBackend>> {
        let bert = self.bert(dir)?;
        let classifier = bert.head("classifier", num_labels)?;
        Ok(Arc::new(CandleTokenClassifier { bert, classifier }))
    }

    fn span_classifier(&self, dir: &ModelDirectory) -> Result<Arc<dyn SpanClassifierBackend>> {
        let bert = self.bert(dir)?;
        let qa_outputs = bert.head("qa_outputs", 2)?;
        Ok(Arc::new(CandleSpanClassifier { bert, qa_outputs }))
    }

    fn sequence_classifier(
        &self,
        dir: &ModelDirectory,
        num_labels: usize,
    ) -> Result<Arc<dyn SequenceClassifierBackend>> {
        let bert = self.bert(dir)?;
        let pooler = bert.pooler()?;
        let classifier = bert.head("classifier", num_labels)?;
        Ok(Arc::new(CandleSequenceClassifier {
            bert,
            pooler,
            classifier,
        }))
    }

    fn generator(&self, dir: &ModelDirectory) -> Result<Arc<dyn GenerationBackend>> {
        if dir.model_type() != "marian" {
            return Err(self.unsupported(dir, "generator"));
        }
        let config: MarianConfig = serde_json::from_str(dir.config_json())
            .map_err(|e| TaskError::Config(format!("Unsupported Marian config: {}", e)))?;
        let device = Self::device();
        let vb = Self::var_builder(dir, &device)?;
        let model = MTModel::new(&config, vb).map_err(load_err)?;
        tracing::info!(path = %dir.path().display(), "Candle Marian model loaded");
        Ok(Arc::new(CandleGenerator {
            model: Mutex::new(model),
            config,
            device,
        }))
    }
}

struct CandleEncoder {
    bert: LoadedBert,
}

#[async_trait]
impl EncoderBackend for CandleEncoder {
    async fn encode(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>> {
        self.bert
            .hidden_states(input)?
            .to_vec2::<f32>()
            .map_err(inference)
    }
}

struct CandleTokenClassifier {
    bert: LoadedBert,
    classifier: Linear,
}

#[async_trait]
impl TokenClassifierBackend for CandleTokenClassifier {
    async fn classify_tokens(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>> {
        let hidden = self.bert.hidden_states(input)?;
        self.classifier
            .forward(&hidden)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(inference)
    }
}

struct CandleSpanClassifier {
    bert: LoadedBert,
    qa_outputs: Linear,
}

#[async_trait]
impl SpanClassifierBackend for CandleSpanClassifier {
    async fn span_logits(&self, input: &TokenizedInput) -> Result<SpanLogits> {
        let hidden = self.bert.hidden_states(input)?;
        let rows = self
            .qa_outputs
            .forward(&hidden)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(inference)?;
        let (start, end) = rows
            .into_iter()
            .map(|row| (row.first().copied().unwrap_or(0.0), row.get(1).copied().unwrap_or(0.0)))
            .unzip();
        Ok(SpanLogits { start, end })
    }
}

struct CandleSequenceClassifier {
    bert: LoadedBert,
    pooler: Linear,
    classifier: Linear,
}

#[async_trait]
impl SequenceClassifierBackend for CandleSequenceClassifier {
    async fn classify_sequence(&self, input: &TokenizedInput) -> Result<Vec<f32>> {
        let hidden = self.bert.hidden_states(input)?;
        hidden
            .narrow(0, 0, 1)
            .and_then(|cls| self.pooler.forward(&cls))
            .and_then(|pooled| pooled.tanh())
            .and_then(|pooled| self.classifier.forward(&pooled))
            .and_then(|logits| logits.squeeze(0))
            .and_then(|logits| logits.to_vec1::<f32>())
            .map_err(inference)
    }
}

struct CandleGenerator {
    model: Mutex<MTModel>,
    config: MarianConfig,
    device: Device,
}

impl CandleGenerator {
    fn sampling(options: &GenerationOptions) -> Sampling {
        if !options.use_sampling {
            return Sampling::ArgMax;
        }
        let temperature = f64::from(options.temperature.unwrap_or(1.0));
        match (options.top_k, options.top_p) {
            (Some(k), Some(p)) => Sampling::TopKThenTopP {
                k,
                p: f64::from(p),
                temperature,
            },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP {
                p: f64::from(p),
                temperature,
            },
            (None, None) => Sampling::All { temperature },
        }
    }

    fn decode_one(
        &self,
        model: &mut MTModel,
        input_ids: &[u32],
        options: &GenerationOptions,
        seed: u64,
    ) -> Result<GeneratedSequence> {
        model.reset_kv_cache();
        let tokens = Tensor::new(input_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference)?;
        let encoder_xs = model.encoder().forward(&tokens, 0).map_err(inference)?;

        let mut processor = LogitsProcessor::from_sampling(seed, Self::sampling(options));
        let max_len = options.max_length.unwrap_or(DEFAULT_MAX_GENERATED);
        let min_len = options.min_length.unwrap_or(0);
        let eos = self.config.eos_token_id;

        let mut ids = vec![self.config.decoder_start_token_id];
        let mut score = 0.0f64;
        for step in 0..max_len {
            let context = if step == 0 { ids.len() } else { 1 };
            let start_pos = ids.len() - context;
            let decoder_in = Tensor::new(&ids[start_pos..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(inference)?;
            let logits = model
                .decode(&decoder_in, &encoder_xs, start_pos)
                .and_then(|t| t.squeeze(0))
                .map_err(inference)?;
            let last = logits.dim(0).map_err(inference)? - 1;
            let mut row = logits
                .get(last)
                .and_then(|t| t.to_vec1::<f32>())
                .map_err(inference)?;
            if step < min_len
                && let Some(slot) = row.get_mut(eos as usize)
            {
                *slot = f32::NEG_INFINITY;
            }
            let masked = Tensor::new(row.as_slice(), &self.device).map_err(inference)?;
            let next = processor.sample(&masked).map_err(inference)?;
            score += log_prob(&row, next as usize);
            ids.push(next);
            if next == eos || next == self.config.forced_eos_token_id {
                break;
            }
        }
        Ok(GeneratedSequence { ids, score })
    }
}

fn log_prob(logits: &[f32], index: usize) -> f64 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f64 = logits
        .iter()
        .map(|&l| f64::from(l - max).exp())
        .sum();
    logits
        .get(index)
        .map_or(f64::NEG_INFINITY, |&l| f64::from(l - max) - sum.ln())
}

#[async_trait]
impl GenerationBackend for CandleGenerator {
    async fn generate(
        &self,
        input_ids: &[u32],
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedSequence>> {
        if options.num_beams.is_some_and(|b| b > 1) {
            tracing::debug!("Beam search not available on the candle backend, decoding per sequence");
        }
        let count = options.num_return_sequences.unwrap_or(1).max(1);
        let mut model = self.model.lock().await;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.decode_one(&mut model, input_ids, options, SAMPLING_SEED + i as u64)?);
        }
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(out)
    }
}
