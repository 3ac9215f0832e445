use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{
    confidence,
    embedding::{Embedder, l2_normalize},
    error::{Error, Result},
    vector_index::{VectorIndex, VectorSearch},
};

/// Candidates fetched per requested result before threshold filtering.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 3;

pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub source: PathBuf,
    pub page: u32,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub top_k: usize,
    pub similarity_threshold: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Answers queries against one index with one embedder.
///
/// The retriever starts without an index; searching before one is
/// attached fails with [`Error::IndexNotLoaded`]. An attached index that
/// simply has nothing above the threshold yields an empty result.
pub struct Retriever<E, I = VectorIndex> {
    embedder: E,
    index: Option<I>,
    overfetch_factor: usize,
}

impl<E: Embedder, I: VectorSearch> Retriever<E, I> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            index: None,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
        }
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    pub fn with_index(mut self, index: I) -> Result<Self> {
        self.set_index(index)?;
        Ok(self)
    }

    /// Attach `index`, replacing any previous one.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the index was built
    /// with vectors of a different size than the embedder produces.
    pub fn set_index(&mut self, index: I) -> Result<()> {
        let model = self.embedder.dimension()?;
        if index.dimension() != model {
            return Err(Error::DimensionMismatch {
                index: index.dimension(),
                model,
            });
        }
        self.index = Some(index);
        Ok(())
    }

    pub fn index(&self) -> Option<&I> {
        self.index.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.index.is_some()
    }

    pub fn embedder_mut(&mut self) -> &mut E {
        &mut self.embedder
    }

    /// Retrieve up to `top_k` chunks whose similarity to `query` is at
    /// least `threshold`, best first.
    pub fn retrieve(
        &mut self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let Some(index) = self.index.as_ref() else {
            return Err(Error::IndexNotLoaded);
        };
        if top_k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_vector = self.embedder.encode_one(query)?;
        l2_normalize(&mut query_vector);

        let fetch =
            top_k.saturating_mul(self.overfetch_factor).min(index.len());
        let candidates = index.search(&query_vector, fetch)?;

        let mut results = Vec::with_capacity(top_k);
        for (position, similarity) in candidates {
            if similarity < threshold {
                continue;
            }
            let Some(chunk) = index.chunk(position) else {
                tracing::warn!(
                    position,
                    "search returned position without metadata"
                );
                continue;
            };
            results.push(SearchResult {
                text: chunk.text().to_string(),
                source: chunk.source().to_path_buf(),
                page: chunk.page(),
                similarity,
            });
            if results.len() == top_k {
                break;
            }
        }

        tracing::debug!(
            fetched = fetch,
            kept = results.len(),
            top_k,
            threshold,
            "retrieved chunks"
        );
        Ok(results)
    }

    /// Confidence of `results` as context for `query`.
    pub fn confidence(
        &mut self,
        query: &str,
        results: &[SearchResult],
    ) -> Result<f32> {
        confidence::confidence(&mut self.embedder, query, results)
    }
}

impl<E: Embedder> Retriever<E, VectorIndex> {
    /// Load the index persisted at `path` and attach it.
    pub fn load_index(&mut self, path: &Path) -> Result<()> {
        let index = VectorIndex::load(path)?;
        if index.model_id() != self.embedder.model_id() {
            tracing::warn!(
                index_model = index.model_id(),
                model = self.embedder.model_id(),
                "index was built with a different model"
            );
        }
        self.set_index(index)
    }
}

/// Print results for a terminal.
pub fn format_human(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (rank, r) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {} p.{}",
            rank + 1,
            r.similarity,
            r.source.display(),
            r.page
        );
        let preview: String = r.text.chars().take(160).collect();
        let preview = preview.split_whitespace().collect::<Vec<_>>().join(" ");
        println!("     {preview}");
    }
}

/// Print results as a JSON array.
pub fn format_json(results: &[SearchResult]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}
