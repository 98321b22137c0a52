//! BGE-M3 (XLM-RoBERTa) sentence embeddings on candle.
use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use fieldctx_core::config::expand_path;
use fieldctx_core::traits::EmbeddingProvider;
use fieldctx_core::Error;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

struct Model {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
}

#[derive(Clone)]
pub struct CandleEmbedder {
    inner: Arc<Model>,
}

impl CandleEmbedder {
    /// Loads `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        ensure!(max_len > 0, "embedding max_len must be > 0");
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {e}", tokenizer_path.display()))?;
        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?
            .into_iter()
            .collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, max_len, "BGE-M3 model loaded");
        Ok(Self { inner: Arc::new(Model { model, tokenizer, device, max_len, dim }) })
    }
}

impl Model {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let v: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        ensure!(v.len() == self.dim, "model produced dim {}, expected {}", v.len(), self.dim);
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(elapsed_ms = elapsed.as_millis(), "slow embedding");
        } else {
            debug!(elapsed_ms = elapsed.as_millis(), "embedded query");
        }
        Ok(v)
    }
}

#[async_trait]
impl EmbeddingProvider for CandleEmbedder {
    fn dim(&self) -> usize { self.inner.dim }

    async fn embed(&self, text: &str) -> fieldctx_core::Result<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.embed(&text))
            .await
            .map_err(|e| Error::embedding(format!("embedding worker: {e}")))?
            .map_err(|e| Error::embedding(format!("{e:#}")))
    }
}

/// First existing directory of: the configured path, `APP_MODEL_DIR`,
/// `MODEL_DIR`, then `models/bge-m3`.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(str::to_string)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok())
        .chain(std::env::var("MODEL_DIR").ok())
        .chain(std::iter::once("models/bge-m3".to_string()));
    for dir in candidates {
        let p = expand_path(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
