use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{
    PaddingParams,
    PaddingStrategy,
    Tokenizer,
    TruncationParams,
};
use tracing::{debug, info};

use crate::{
    embedding::{Embedder, check_batch},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const MODEL_ENV_VAR: &str = "TXTINDEX_MODEL";

/// Longer inputs are truncated to this many tokens.
const MAX_SEQUENCE_LENGTH: usize = 256;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Sentence-transformer embedder with lazy model loading.
///
/// Runs a BERT encoder through candle, mean-pools token states under the
/// attention mask and L2-normalizes the result.
pub struct ModelManager {
    model: Option<LoadedModel>,
    model_id: String,
    dimension: Option<usize>,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// Creates a new `ModelManager`. The model ID is resolved from:
    /// 1. The `TXTINDEX_MODEL` environment variable, if set
    /// 2. Otherwise, the default model
    ///    (`sentence-transformers/all-MiniLM-L6-v2`)
    ///
    /// Nothing is loaded until [`ModelManager::load`] or the first embed.
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    /// Creates a `ModelManager` with an explicit model ID or local model
    /// directory, bypassing environment variable resolution.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
            dimension: None,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Load the model now, downloading it from the HuggingFace Hub if needed.
    pub fn load(&mut self) -> Result<()> {
        self.ensure_loaded().map(|_| ())
    }

    fn ensure_loaded(&mut self) -> Result<&LoadedModel> {
        if self.model.is_none() {
            self.model = Some(load_model(&self.model_id)?);
        }
        self.model
            .as_ref()
            .ok_or_else(|| Error::Embedding("model not loaded".to_string()))
    }

    /// Encode texts into one normalized sentence vector each.
    pub fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let loaded = self.ensure_loaded()?;
        let encodings = loaded
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;

        let ids = encodings
            .iter()
            .map(|e| Tensor::new(e.get_ids(), &loaded.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let masks = encodings
            .iter()
            .map(|e| Tensor::new(e.get_attention_mask(), &loaded.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let input_ids = Tensor::stack(&ids, 0)?;
        let attention_mask = Tensor::stack(&masks, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = loaded.model.forward(
            &input_ids,
            &token_type_ids,
            Some(&attention_mask),
        )?;
        let pooled = mean_pool_normalized(&hidden, &attention_mask)?;
        let vectors = pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?;

        check_batch(texts, &vectors)?;
        if let Some(first) = vectors.first() {
            self.dimension = Some(first.len());
        }
        Ok(vectors)
    }
}

impl Embedder for ModelManager {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode(texts)
    }
}

/// Model files either from a local directory or the HuggingFace Hub cache.
fn resolve_model_files(model_id: &str) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let local = Path::new(model_id);
    if local.is_dir() {
        return Ok((
            local.join(CONFIG_FILE),
            local.join(TOKENIZER_FILE),
            local.join(WEIGHTS_FILE),
        ));
    }

    let api = hf_hub::api::sync::Api::new().map_err(|e| {
        Error::Embedding(format!("cannot reach the model hub: {e}"))
    })?;
    let repo = api.model(model_id.to_string());
    let fetch = |name: &str| {
        repo.get(name).map_err(|e| {
            Error::Embedding(format!("failed to fetch {model_id}/{name}: {e}"))
        })
    };
    Ok((fetch(CONFIG_FILE)?, fetch(TOKENIZER_FILE)?, fetch(WEIGHTS_FILE)?))
}

fn load_model(model_id: &str) -> Result<LoadedModel> {
    info!(model = model_id, "loading embedding model");
    let (config_path, tokenizer_path, weights_path) =
        resolve_model_files(model_id)?;

    let config_text = std::fs::read_to_string(&config_path).map_err(|e| {
        Error::Embedding(format!(
            "cannot read model config {}: {e}",
            config_path.display()
        ))
    })?;
    let config: Config = serde_json::from_str(&config_text).map_err(|e| {
        Error::Embedding(format!("invalid model config: {e}"))
    })?;

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
        Error::Embedding(format!(
            "cannot load tokenizer {}: {e}",
            tokenizer_path.display()
        ))
    })?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_LENGTH,
            ..Default::default()
        }))
        .map_err(|e| Error::Embedding(format!("invalid truncation: {e}")))?;

    let device = default_device();
    let tensors = candle_core::safetensors::load(&weights_path, &device)?;
    let vb = VarBuilder::from_tensors(tensors, DTYPE, &device);
    let model = BertModel::load(vb, &config)?;

    debug!(model = model_id, device = ?device, "embedding model ready");
    Ok(LoadedModel {
        model,
        tokenizer,
        device,
    })
}

/// Mean of token states where the attention mask is set, scaled to unit
/// length. `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`.
fn mean_pool_normalized(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    let mean = summed.broadcast_div(&counts)?;

    let eps = Tensor::new(&[1e-12f32], hidden.device())?
        .to_dtype(hidden.dtype())?
        .unsqueeze(0)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    Ok(mean.broadcast_div(&norm)?)
}
