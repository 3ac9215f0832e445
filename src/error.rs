use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("model error: {0}")]
    Model(String),

    #[error(
        "embedding model {model_id} unavailable after {attempts} attempt(s): {reason}"
    )]
    ModelUnavailable {
        model_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("no chunks to index: the corpus produced zero chunks")]
    EmptyCorpus,

    #[error("no index found at {0}")]
    MissingIndex(PathBuf),

    #[error("corrupt index at {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error(
        "embedding dimension mismatch: index has {index}, model produces {model}"
    )]
    DimensionMismatch { index: usize, model: usize },

    #[error("no index loaded: build or load an index before searching")]
    IndexNotLoaded,

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
