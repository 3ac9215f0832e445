//! ragindex - passage retrieval with confidence and citations over local
//! document corpora.
//!
//! ragindex splits `.txt` and `.md` documents into overlapping chunks,
//! embeds them with a [ColBERT](https://github.com/stanford-futuredata/ColBERT)
//! model, and answers queries with an exact inner-product search. Each
//! query yields ranked passages, a confidence score and one citation per
//! source document.
//!
//! # Quick start
//!
//! ```no_run
//! use ragindex::{
//!     ChunkingConfig, Retriever, VectorIndex,
//!     embedding::EmbeddingBackend,
//!     model_manager::DEFAULT_MODEL_ID,
//!     pipeline::{self, ExtractiveSynthesizer},
//!     retry::RetryPolicy,
//!     search::SearchParams,
//! };
//! use std::path::Path;
//!
//! let mut embedder =
//!     EmbeddingBackend::from_env(DEFAULT_MODEL_ID, &RetryPolicy::default())
//!         .unwrap();
//! pipeline::rebuild_index(
//!     Path::new("./docs"),
//!     Path::new("./index"),
//!     &ChunkingConfig::default(),
//!     &mut embedder,
//!     32,
//!     |_, _| {},
//! )
//! .unwrap();
//!
//! let mut retriever: Retriever<_, VectorIndex> = Retriever::new(embedder);
//! retriever.load_index(Path::new("./index")).unwrap();
//!
//! let answer = pipeline::answer(
//!     &mut retriever,
//!     &mut ExtractiveSynthesizer::default(),
//!     "What are the welding requirements?",
//!     &SearchParams::default(),
//! )
//! .unwrap();
//! println!("{} (confidence {:.4})", answer.text, answer.confidence);
//! for c in &answer.citations {
//!     println!("  {} ({:.3})", c.file_name(), c.similarity);
//! }
//! ```

pub mod chunking;
pub mod citations;
pub mod cli;
pub mod confidence;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod ingestion;
pub mod mcp;
pub mod model_manager;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod vector_index;
pub mod vector_store;
pub mod walker;

pub use chunking::{Chunk, ChunkingConfig};
pub use config::RetrievalConfig;
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use embedding::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use model_manager::ModelManager;
pub use search::{Retriever, SearchResult};
pub use vector_index::{VectorIndex, VectorSearch};
