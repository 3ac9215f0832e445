//! Text embedding: the [`Embedder`] seam, vector math, and the embedders
//! shipped with the crate.
//!
//! Blank input (empty or whitespace-only) always embeds to the all-zero
//! vector. Its cosine similarity with anything is 0.0, so a blank query
//! never clears a positive threshold.

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::{
    error::{Error, Result},
    model_manager::ModelManager,
    retry::RetryPolicy,
};

/// Set to `1` or `true` to use [`HashEmbedder`] instead of downloading a model.
pub const FAKE_EMBEDDINGS_ENV_VAR: &str = "RAGINDEX_FAKE_EMBEDDINGS";

/// Model identifier reported by [`HashEmbedder`].
pub const HASH_EMBEDDER_MODEL_ID: &str = "ragindex/hash-bow";

/// Default dimension of [`HashEmbedder`] vectors.
pub const DEFAULT_HASH_DIMENSION: usize = 256;

/// Encodes text into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input text, in
/// input order, all of the same dimension.
pub trait Embedder {
    /// Identifier of the underlying model, recorded in built indexes.
    fn model_id(&self) -> &str;

    /// Dimension of produced vectors. May need to run the model once.
    fn dimension(&mut self) -> Result<usize>;

    /// Encode a batch of texts.
    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single text, typically a query.
    fn encode_one(&mut self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Model("embedder returned no vector".into()))
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot(a, b) / (norm_a * norm_b)
    }
}

/// Deterministic bag-of-words embedder that needs no model download.
///
/// Lowercased alphanumeric tokens are hashed into buckets and the counts
/// L2-normalized. It captures lexical overlap only; useful for tests and
/// air-gapped smoke runs, not for real retrieval quality.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.to_lowercase().as_bytes());
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            v[bucket] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        HASH_EMBEDDER_MODEL_ID
    }

    fn dimension(&mut self) -> Result<usize> {
        Ok(self.dimension)
    }

    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Whether `RAGINDEX_FAKE_EMBEDDINGS` asks for [`HashEmbedder`].
pub fn fake_embeddings_enabled() -> bool {
    std::env::var(FAKE_EMBEDDINGS_ENV_VAR)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// The embedder a process runs with, chosen once at startup.
pub enum EmbeddingBackend {
    Model(ModelManager),
    Hash(HashEmbedder),
}

impl EmbeddingBackend {
    /// Pick the backend: [`HashEmbedder`] when
    /// `RAGINDEX_FAKE_EMBEDDINGS` is set, otherwise load `model_id` with
    /// retry. Failing to acquire the model is fatal to the caller.
    pub fn from_env(model_id: &str, policy: &RetryPolicy) -> Result<Self> {
        if fake_embeddings_enabled() {
            tracing::info!("using hash embeddings, no model will be loaded");
            return Ok(Self::Hash(HashEmbedder::default()));
        }

        Ok(Self::Model(ModelManager::load(model_id, policy)?))
    }
}

impl Embedder for EmbeddingBackend {
    fn model_id(&self) -> &str {
        match self {
            Self::Model(m) => m.model_id(),
            Self::Hash(h) => h.model_id(),
        }
    }

    fn dimension(&mut self) -> Result<usize> {
        match self {
            Self::Model(m) => m.dimension(),
            Self::Hash(h) => h.dimension(),
        }
    }

    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Model(m) => m.encode(texts),
            Self::Hash(h) => h.encode(texts),
        }
    }
}

impl std::fmt::Debug for EmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EmbeddingBackend")
            .field(&self.model_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        dot(v, v).sqrt()
    }

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        let parallel = cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]);
        assert!((parallel - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn hash_embedder_is_deterministic_and_normalized() {
        let mut embedder = HashEmbedder::default();
        let texts = vec!["Welding requirements".to_string()];
        let a = embedder.encode(&texts).unwrap();
        let b = embedder.encode(&texts).unwrap();

        assert_eq!(a, b);
        assert_eq!(a[0].len(), DEFAULT_HASH_DIMENSION);
        assert!((norm(&a[0]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedder_blank_text_is_zero_vector() {
        let mut embedder = HashEmbedder::new(16);
        let v = embedder.encode_one("   ").unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn hash_embedder_is_case_insensitive() {
        let mut embedder = HashEmbedder::default();
        let a = embedder.encode_one("Rust Ownership").unwrap();
        let b = embedder.encode_one("rust ownership").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_embedder_reflects_lexical_overlap() {
        let mut embedder = HashEmbedder::default();
        let query = embedder.encode_one("welding requirements").unwrap();
        let close = embedder
            .encode_one("requirements for welding of pipelines")
            .unwrap();
        let far = embedder.encode_one("banana bread recipe").unwrap();

        assert!(
            cosine_similarity(&query, &close) > cosine_similarity(&query, &far)
        );
    }

    #[test]
    fn encode_preserves_length_and_order() {
        let mut embedder = HashEmbedder::default();
        let texts: Vec<String> =
            ["alpha", "", "beta"].iter().map(|s| s.to_string()).collect();
        let vectors = embedder.encode(&texts).unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], embedder.encode_one("alpha").unwrap());
        assert!(vectors[1].iter().all(|x| *x == 0.0));
        assert_eq!(vectors[2], embedder.encode_one("beta").unwrap());
    }
}
