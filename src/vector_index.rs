//! Exact inner-product index over normalized chunk embeddings.
//!
//! An index on disk is a directory holding two artifacts:
//!
//! - `vectors.redb`: one row per chunk position plus a small header
//!   (dimension, row count, model id);
//! - `metadata.json`: a JSON array of `{text, source, page}` records, one
//!   per position.
//!
//! Both must be present and agree on the row count. [`VectorIndex::persist`]
//! replaces the whole directory atomically, so a reader sees either the old
//! index or the new one.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    embedding::{Embedder, dot, l2_normalize},
    error::{Error, Result},
    vector_store::VectorStore,
};

pub const VECTORS_FILE: &str = "vectors.redb";
pub const METADATA_FILE: &str = "metadata.json";

/// Number of chunks sent to the embedder per call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Read access to a searchable set of chunk vectors.
pub trait VectorSearch {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    /// Top `k` positions by inner product with `query`, best first.
    ///
    /// Returns at most `min(k, len)` pairs. Equal scores keep position
    /// order. A query of the wrong length is a
    /// [`Error::DimensionMismatch`].
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    fn chunk(&self, position: usize) -> Option<&Chunk>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkRecord {
    text: String,
    source: PathBuf,
    #[serde(default = "first_page")]
    page: u32,
}

fn first_page() -> u32 {
    1
}

/// Chunk vectors and their metadata, row `i` belonging to `chunks[i]`.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    model_id: String,
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Embed `chunks` in batches of `batch_size` and index them.
    pub fn build<E: Embedder + ?Sized>(
        chunks: Vec<Chunk>,
        embedder: &mut E,
        batch_size: usize,
    ) -> Result<Self> {
        Self::build_with_progress(chunks, embedder, batch_size, |_, _| {})
    }

    /// Like [`VectorIndex::build`], calling `progress(done, total)` after
    /// each batch.
    pub fn build_with_progress<E, F>(
        chunks: Vec<Chunk>,
        embedder: &mut E,
        batch_size: usize,
        mut progress: F,
    ) -> Result<Self>
    where
        E: Embedder + ?Sized,
        F: FnMut(usize, usize),
    {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let total = chunks.len();
        let batch_size = batch_size.max(1);
        let mut dimension: Option<usize> = None;
        let mut vectors = Vec::new();
        let mut done = 0;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> =
                batch.iter().map(|c| c.text().to_string()).collect();
            let encoded = embedder.encode(&texts)?;
            if encoded.len() != texts.len() {
                return Err(Error::Model(format!(
                    "embedder returned {} vectors for {} texts",
                    encoded.len(),
                    texts.len()
                )));
            }

            for mut vector in encoded {
                let dim = *dimension.get_or_insert(vector.len());
                if vector.len() != dim {
                    return Err(Error::DimensionMismatch {
                        index: dim,
                        model: vector.len(),
                    });
                }
                l2_normalize(&mut vector);
                vectors.extend_from_slice(&vector);
            }

            done += batch.len();
            progress(done, total);
            tracing::debug!(done, total, "embedded batch");
        }

        let dimension = dimension.unwrap_or_default();
        if dimension == 0 {
            return Err(Error::Model("embedder produced empty vectors".into()));
        }

        tracing::info!(
            chunks = total,
            dimension,
            model = embedder.model_id(),
            "built vector index"
        );

        Ok(Self {
            dimension,
            model_id: embedder.model_id().to_string(),
            vectors,
            chunks,
        })
    }

    /// Index precomputed vectors. Rows are normalized on the way in.
    pub fn from_vectors(
        model_id: impl Into<String>,
        rows: Vec<Vec<f32>>,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        if rows.len() != chunks.len() {
            return Err(Error::Config(format!(
                "{} vectors for {} chunks",
                rows.len(),
                chunks.len()
            )));
        }

        let dimension = rows[0].len();
        let mut vectors = Vec::with_capacity(rows.len() * dimension);
        for mut row in rows {
            if row.len() != dimension || dimension == 0 {
                return Err(Error::DimensionMismatch {
                    index: dimension,
                    model: row.len(),
                });
            }
            l2_normalize(&mut row);
            vectors.extend(row);
        }

        Ok(Self {
            dimension,
            model_id: model_id.into(),
            vectors,
            chunks,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The normalized vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Returns `true` when both artifacts exist under `path`.
    pub fn exists(path: &Path) -> bool {
        path.join(VECTORS_FILE).is_file() && path.join(METADATA_FILE).is_file()
    }

    /// Write the index to `path`, replacing any index already there.
    ///
    /// Artifacts are written to a hidden staging directory next to `path`
    /// and swapped in with renames. On failure the staging directory is
    /// removed and an existing index at `path` is left as it was.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let (parent, name) = split_target(path)?;
        std::fs::create_dir_all(&parent)?;

        let pid = std::process::id();
        let staging = parent.join(format!(".{name}.staging-{pid}"));
        let retired = parent.join(format!(".{name}.retired-{pid}"));
        remove_dir_if_exists(&staging)?;

        if let Err(e) = self.write_artifacts(&staging) {
            if let Err(cleanup) = remove_dir_if_exists(&staging) {
                tracing::warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "failed to remove staging directory"
                );
            }
            return Err(e);
        }

        swap_into_place(&staging, path, &retired)?;
        tracing::info!(
            path = %path.display(),
            chunks = self.len(),
            "persisted vector index"
        );
        Ok(())
    }

    fn write_artifacts(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir(dir)?;

        let store = VectorStore::create(&dir.join(VECTORS_FILE))?;
        store.write(self.dimension, &self.model_id, &self.vectors)?;
        drop(store);

        let records: Vec<ChunkRecord> = self
            .chunks
            .iter()
            .map(|c| ChunkRecord {
                text: c.text().to_string(),
                source: c.source().to_path_buf(),
                page: c.page(),
            })
            .collect();

        let mut writer = BufWriter::new(File::create(dir.join(METADATA_FILE))?);
        serde_json::to_writer_pretty(&mut writer, &records)?;
        writer.flush()?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }

    /// Load an index written by [`VectorIndex::persist`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::MissingIndex(path.to_path_buf()));
        }
        let vectors_path = path.join(VECTORS_FILE);
        let metadata_path = path.join(METADATA_FILE);
        for artifact in [&vectors_path, &metadata_path] {
            if !artifact.is_file() {
                return Err(Error::MissingIndex(artifact.clone()));
            }
        }

        let stored = VectorStore::open(&vectors_path)?.read()?;

        let corrupt = |reason: String| Error::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let reader = BufReader::new(File::open(&metadata_path)?);
        let records: Vec<ChunkRecord> = serde_json::from_reader(reader)
            .map_err(|e| corrupt(format!("unreadable {METADATA_FILE}: {e}")))?;

        if records.len() != stored.count {
            return Err(corrupt(format!(
                "{} vectors but {} metadata records",
                stored.count,
                records.len()
            )));
        }
        if records.is_empty() {
            return Err(corrupt("index holds no chunks".into()));
        }

        let mut ordinals: HashMap<PathBuf, usize> = HashMap::new();
        let mut chunks = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            let ordinal = ordinals.entry(record.source.clone()).or_default();
            let chunk =
                Chunk::new(record.text, record.source, record.page, *ordinal)
                    .map_err(|e| corrupt(format!("record {position}: {e}")))?;
            *ordinal += 1;
            chunks.push(chunk);
        }

        tracing::debug!(
            path = %path.display(),
            chunks = chunks.len(),
            dimension = stored.dimension,
            model = %stored.model_id,
            "loaded vector index"
        );

        Ok(Self {
            dimension: stored.dimension,
            model_id: stored.model_id,
            vectors: stored.data,
            chunks,
        })
    }
}

impl VectorSearch for VectorIndex {
    fn len(&self) -> usize {
        self.chunks.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                index: self.dimension,
                model: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| (position, dot(row, query)))
            .collect();

        // Stable: equal scores stay in position order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }
}

fn split_target(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            Error::Config(format!("invalid index path: {}", path.display()))
        })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn swap_into_place(
    staging: &Path,
    target: &Path,
    retired: &Path,
) -> Result<()> {
    let had_previous = target.exists();
    if had_previous {
        remove_dir_if_exists(retired)?;
        if let Err(e) = std::fs::rename(target, retired) {
            remove_dir_if_exists(staging).ok();
            return Err(e.into());
        }
    }

    if let Err(e) = std::fs::rename(staging, target) {
        if had_previous && let Err(restore) = std::fs::rename(retired, target) {
            tracing::warn!(
                path = %target.display(),
                error = %restore,
                "failed to restore previous index"
            );
        }
        remove_dir_if_exists(staging).ok();
        return Err(e.into());
    }

    if had_previous && let Err(e) = remove_dir_if_exists(retired) {
        tracing::warn!(
            path = %retired.display(),
            error = %e,
            "failed to remove retired index"
        );
    }
    Ok(())
}
