//! End-to-end flows: rebuilding an index from a document tree and
//! answering a question from retrieved context.

use std::path::Path;

use serde::Serialize;

use crate::{
    chunking::{ChunkingConfig, chunk_documents},
    citations::{Citation, select_citations},
    embedding::Embedder,
    error::{Error, Result},
    ingestion::load_documents,
    search::{Retriever, SearchParams, SearchResult},
    vector_index::{VectorIndex, VectorSearch},
    walker::discover_files,
};

/// Returned instead of an answer when nothing relevant was retrieved.
pub const NO_ANSWER_TEXT: &str =
    "I could not find a reliable answer to this question in the indexed documents.";

/// Turns retrieved context into an answer.
pub trait AnswerSynthesizer {
    fn synthesize(
        &mut self,
        query: &str,
        context: &[SearchResult],
        confidence: f32,
    ) -> Result<String>;
}

/// Answers with the best retrieved passage, trimmed to `max_chars`.
///
/// Stands in for a generative model when none is configured.
#[derive(Debug, Clone)]
pub struct ExtractiveSynthesizer {
    pub max_chars: usize,
}

impl Default for ExtractiveSynthesizer {
    fn default() -> Self {
        Self { max_chars: 600 }
    }
}

impl AnswerSynthesizer for ExtractiveSynthesizer {
    fn synthesize(
        &mut self,
        _query: &str,
        context: &[SearchResult],
        _confidence: f32,
    ) -> Result<String> {
        let Some(best) = context.first() else {
            return Ok(NO_ANSWER_TEXT.to_string());
        };
        let text = best.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.chars().count() <= self.max_chars {
            return Ok(text);
        }
        let truncated: String = text.chars().take(self.max_chars).collect();
        Ok(format!("{}...", truncated.trim_end()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub context: Vec<SearchResult>,
    pub citations: Vec<Citation>,
    pub confidence: f32,
}

/// Retrieve context for `query` and synthesize an answer from it.
///
/// With no qualifying context the synthesizer is not called; the answer
/// is [`NO_ANSWER_TEXT`] with zero confidence and no citations.
pub fn answer<E, I, S>(
    retriever: &mut Retriever<E, I>,
    synthesizer: &mut S,
    query: &str,
    params: &SearchParams,
) -> Result<Answer>
where
    E: Embedder,
    I: VectorSearch,
    S: AnswerSynthesizer + ?Sized,
{
    let context =
        retriever.retrieve(query, params.top_k, params.similarity_threshold)?;
    if context.is_empty() {
        tracing::info!("no context above threshold");
        return Ok(Answer {
            text: NO_ANSWER_TEXT.to_string(),
            context,
            citations: Vec::new(),
            confidence: 0.0,
        });
    }

    let confidence = retriever.confidence(query, &context)?;
    let text = synthesizer.synthesize(query, &context, confidence)?;
    let citations = select_citations(&context);

    Ok(Answer {
        text,
        context,
        citations,
        confidence,
    })
}

/// Outcome of [`rebuild_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub documents: usize,
    pub chunks: usize,
}

/// Discover, chunk, embed and persist the documents under `corpus`.
///
/// The new index replaces the one at `index_path` only once it is fully
/// built and written; any failure leaves the previous index in place.
pub fn rebuild_index<E, F>(
    corpus: &Path,
    index_path: &Path,
    chunking: &ChunkingConfig,
    embedder: &mut E,
    batch_size: usize,
    progress: F,
) -> Result<RebuildSummary>
where
    E: Embedder + ?Sized,
    F: FnMut(usize, usize),
{
    let files = discover_files(corpus)?;
    let documents = load_documents(&files);
    let chunks = chunk_documents(&documents, chunking)?;
    if chunks.is_empty() {
        return Err(Error::EmptyCorpus);
    }

    let summary = RebuildSummary {
        documents: documents.len(),
        chunks: chunks.len(),
    };
    tracing::info!(
        documents = summary.documents,
        chunks = summary.chunks,
        "chunked corpus"
    );

    let index = VectorIndex::build_with_progress(
        chunks, embedder, batch_size, progress,
    )?;
    index.persist(index_path)?;
    Ok(summary)
}
