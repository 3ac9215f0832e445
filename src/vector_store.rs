use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::{Error, Result};

/// One row per chunk position, value is the raw f32 LE vector.
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const INFO: TableDefinition<&str, &str> = TableDefinition::new("info");

const KEY_DIMENSION: &str = "dimension";
const KEY_COUNT: &str = "count";
const KEY_MODEL_ID: &str = "model_id";

/// Vector artifact of a persisted index.
///
/// Rows are stored keyed by their chunk position so a reader can verify
/// that positions are contiguous and every row has the recorded dimension.
pub struct VectorStore {
    db: Database,
    path: PathBuf,
}

/// Contents of a [`VectorStore`], validated on read.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVectors {
    pub dimension: usize,
    pub model_id: String,
    pub count: usize,
    /// Row-major, `count * dimension` values.
    pub data: Vec<f32>,
}

impl VectorStore {
    /// Create a store at `path`. Callers write into a fresh directory, so
    /// the file is expected not to exist yet.
    pub fn create(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.open_table(INFO)?;
        txn.commit()?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store. A file that is not a valid database is
    /// reported as [`Error::CorruptIndex`].
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingIndex(path.to_path_buf()));
        }
        let db = Database::open(path).map_err(|e| Error::CorruptIndex {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Write all rows and the header in a single transaction.
    pub fn write(
        &self,
        dimension: usize,
        model_id: &str,
        data: &[f32],
    ) -> Result<()> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(Error::Config(format!(
                "{} values do not form rows of dimension {dimension}",
                data.len()
            )));
        }
        let count = data.len() / dimension;

        let txn = self.db.begin_write()?;
        {
            let mut vectors = txn.open_table(VECTORS)?;
            for (position, row) in data.chunks_exact(dimension).enumerate() {
                let bytes: &[u8] = bytemuck::cast_slice(row);
                let mut guard =
                    vectors.insert_reserve(position as u64, bytes.len())?;
                guard.as_mut().copy_from_slice(bytes);
            }

            let mut info = txn.open_table(INFO)?;
            info.insert(KEY_DIMENSION, dimension.to_string().as_str())?;
            info.insert(KEY_COUNT, count.to_string().as_str())?;
            info.insert(KEY_MODEL_ID, model_id)?;
        }
        txn.commit()?;

        tracing::debug!(
            path = %self.path.display(),
            count,
            dimension,
            "wrote vector store"
        );
        Ok(())
    }

    /// Read and validate every row.
    pub fn read(&self) -> Result<StoredVectors> {
        let txn = self.db.begin_read()?;
        let info = txn
            .open_table(INFO)
            .map_err(|e| self.corrupt(format!("missing header table: {e}")))?;

        let dimension: usize = self.header(&info, KEY_DIMENSION)?;
        let count: usize = self.header(&info, KEY_COUNT)?;
        let model_id = info
            .get(KEY_MODEL_ID)?
            .map(|v| v.value().to_string())
            .unwrap_or_default();

        if dimension == 0 {
            return Err(self.corrupt("dimension is zero".into()));
        }

        let vectors = txn
            .open_table(VECTORS)
            .map_err(|e| self.corrupt(format!("missing vectors table: {e}")))?;
        let row_bytes = dimension
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| {
                self.corrupt(format!("dimension {dimension} is out of range"))
            })?;
        if count.checked_mul(row_bytes).is_none() {
            return Err(self.corrupt(format!(
                "header records {count} rows of dimension {dimension}"
            )));
        }
        // Grown row by row; the header count is untrusted until verified.
        let mut data = Vec::new();
        let mut expected: u64 = 0;

        for entry in vectors.iter()? {
            let (key, value) = entry?;
            if key.value() != expected {
                return Err(self.corrupt(format!(
                    "expected row {expected}, found row {}",
                    key.value()
                )));
            }
            let bytes = value.value();
            if bytes.len() != row_bytes {
                return Err(self.corrupt(format!(
                    "row {expected} has {} bytes, expected {row_bytes}",
                    bytes.len()
                )));
            }
            // Stored bytes carry no alignment guarantee.
            data.extend(bytemuck::pod_collect_to_vec::<u8, f32>(bytes));
            expected += 1;
        }

        if expected as usize != count {
            return Err(self.corrupt(format!(
                "header records {count} rows, found {expected}"
            )));
        }

        Ok(StoredVectors {
            dimension,
            model_id,
            count,
            data,
        })
    }

    fn header<T: std::str::FromStr>(
        &self,
        info: &redb::ReadOnlyTable<&'static str, &'static str>,
        key: &str,
    ) -> Result<T> {
        let raw = info
            .get(key)?
            .map(|v| v.value().to_string())
            .ok_or_else(|| self.corrupt(format!("missing header {key}")))?;
        raw.parse()
            .map_err(|_| self.corrupt(format!("invalid header {key}: {raw}")))
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::CorruptIndex {
            path: self.path.clone(),
            reason,
        }
    }
}
