use candle_core::{DType, Device};
use pylate_rs::ColBERT;

use crate::{
    embedding::{Embedder, l2_normalize},
    error::{Error, Result},
    retry::{RetryPolicy, retry_with_backoff},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "RAGINDEX_MODEL";

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

/// Returns `true` when the model's files are already in the local
/// HuggingFace cache, so loading will not touch the network.
pub fn is_cached(model_id: &str) -> bool {
    hf_hub::Cache::from_env()
        .model(model_id.to_string())
        .get("config.json")
        .is_some()
}

/// A loaded ColBERT model producing one pooled vector per text.
///
/// Token embeddings are summed over the token axis and L2-normalized, so
/// inner product between two outputs is their cosine similarity.
pub struct ModelManager {
    model: ColBERT,
    model_id: String,
    dimension: Option<usize>,
}

impl ModelManager {
    /// Load `model_id`, downloading it from the HuggingFace Hub if needed.
    ///
    /// Transient failures are retried under `policy`. When every attempt
    /// fails the result is [`Error::ModelUnavailable`].
    pub fn load(model_id: &str, policy: &RetryPolicy) -> Result<Self> {
        let cached = is_cached(model_id);
        tracing::info!(model = model_id, cached, "loading embedding model");

        let id = model_id.to_string();
        let model = retry_with_backoff(policy, "model load", |_| {
            let loaded: std::result::Result<ColBERT, _> =
                ColBERT::from(&id)
                    .with_device(default_device())
                    .try_into();
            loaded.map_err(|e| e.to_string())
        })
        .map_err(|exhausted| Error::ModelUnavailable {
            model_id: model_id.to_string(),
            attempts: exhausted.attempts,
            reason: exhausted.last_error,
        })?;

        Ok(Self {
            model,
            model_id: model_id.to_string(),
            dimension: None,
        })
    }

    fn encode_non_blank(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self
            .model
            .encode(texts, false)
            .map_err(|e| Error::Model(e.to_string()))?;

        // [batch, tokens, dim] -> [batch, dim]; padding rows are zero.
        let pooled = embeddings.to_dtype(DType::F32)?.sum(1)?.to_vec2::<f32>()?;
        if pooled.len() != texts.len() {
            return Err(Error::Model(format!(
                "model returned {} vectors for {} texts",
                pooled.len(),
                texts.len()
            )));
        }

        Ok(pooled
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

impl Embedder for ModelManager {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&mut self) -> Result<usize> {
        if let Some(dim) = self.dimension {
            return Ok(dim);
        }
        let sample = self.encode_non_blank(&["dimension check".to_string()])?;
        let dim = sample.first().map(Vec::len).unwrap_or_default();
        if dim == 0 {
            return Err(Error::Model("model produced empty embeddings".into()));
        }
        self.dimension = Some(dim);
        Ok(dim)
    }

    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (positions, non_blank): (Vec<usize>, Vec<String>) = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.clone()))
            .unzip();

        let dim = self.dimension()?;
        let mut out = vec![vec![0f32; dim]; texts.len()];
        if non_blank.is_empty() {
            return Ok(out);
        }

        let encoded = self.encode_non_blank(&non_blank)?;
        for (pos, vector) in positions.into_iter().zip(encoded) {
            if vector.len() != dim {
                return Err(Error::DimensionMismatch {
                    index: dim,
                    model: vector.len(),
                });
            }
            out[pos] = vector;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}
