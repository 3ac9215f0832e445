use std::path::PathBuf;

use serde::Serialize;

use crate::{
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    config_db::ConfigDb,
    data_dir::DataDir,
    error::{Error, Result},
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR},
    search::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, SearchParams},
};

/// Setting keys accepted by `ragindex config set`.
pub const SETTING_KEYS: &[&str] = &[
    "model_id",
    "chunk_size",
    "chunk_overlap",
    "top_k",
    "similarity_threshold",
    "index_path",
];

/// Effective configuration for indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalConfig {
    pub model_id: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub index_path: PathBuf,
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model_id: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub index_path: Option<PathBuf>,
}

impl RetrievalConfig {
    pub fn defaults(data_dir: &DataDir) -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            index_path: data_dir.index_dir(),
        }
    }

    /// Layer defaults, stored settings, the `RAGINDEX_MODEL` environment
    /// variable and command-line overrides, later layers winning.
    pub fn resolve(
        data_dir: &DataDir,
        settings: &ConfigDb,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut config = Self::defaults(data_dir);

        for (key, value) in settings.list_settings()? {
            if let Err(e) = config.apply_setting(&key, &value) {
                tracing::warn!(
                    %key,
                    %value,
                    error = %e,
                    "ignoring stored setting"
                );
            }
        }

        if let Some(model) = std::env::var(MODEL_ENV_VAR)
            .ok()
            .filter(|m| !m.trim().is_empty())
        {
            config.model_id = model;
        }

        if let Some(v) = &overrides.model_id {
            config.model_id = v.clone();
        }
        if let Some(v) = overrides.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = overrides.chunk_overlap {
            config.chunk_overlap = v;
        }
        if let Some(v) = overrides.top_k {
            config.top_k = v;
        }
        if let Some(v) = overrides.similarity_threshold {
            config.similarity_threshold = v;
        }
        if let Some(v) = &overrides.index_path {
            config.index_path = v.clone();
        }

        if let Err(e) = config.validate() {
            let stored = settings.list_settings()?;
            if stored.is_empty() {
                return Err(e);
            }
            let stored: Vec<String> =
                stored.iter().map(|(k, v)| format!("{k}={v}")).collect();
            return Err(Error::Config(format!(
                "{e} (stored settings: {}; fix them with \
                 `ragindex config set` or `ragindex config clear`)",
                stored.join(", ")
            )));
        }
        Ok(config)
    }

    /// Remove a stored setting, refusing if the remaining settings would
    /// no longer form a valid configuration.
    ///
    /// Returns `false` when the key was not set.
    pub fn clear_setting(
        data_dir: &DataDir,
        settings: &ConfigDb,
        key: &str,
    ) -> Result<bool> {
        let Some(previous) = settings.get_setting(key)? else {
            return Ok(false);
        };

        settings.remove_setting(key)?;
        let mut remaining = Self::defaults(data_dir);
        for (k, v) in settings.list_settings()? {
            // Unparseable values are skipped by `resolve` too.
            remaining.apply_setting(&k, &v).ok();
        }
        if let Err(e) = remaining.validate() {
            settings.set_setting(key, &previous)?;
            return Err(Error::Config(format!(
                "cannot clear {key}: the remaining settings are invalid ({e})"
            )));
        }
        Ok(true)
    }

    /// Parse and apply one stored setting. The result is not validated.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |e: &dyn std::fmt::Display| {
            Error::Config(format!("{key}={value}: {e}"))
        };

        match key {
            "model_id" => {
                if value.trim().is_empty() {
                    return Err(Error::Config(
                        "model_id must not be empty".into(),
                    ));
                }
                self.model_id = value.to_string();
            }
            "chunk_size" => {
                self.chunk_size = value.parse().map_err(|e| invalid(&e))?
            }
            "chunk_overlap" => {
                self.chunk_overlap = value.parse().map_err(|e| invalid(&e))?
            }
            "top_k" => self.top_k = value.parse().map_err(|e| invalid(&e))?,
            "similarity_threshold" => {
                self.similarity_threshold =
                    value.parse().map_err(|e| invalid(&e))?
            }
            "index_path" => self.index_path = PathBuf::from(value),
            _ => {
                return Err(Error::Config(format!(
                    "unknown setting {key:?}, expected one of: {}",
                    SETTING_KEYS.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be at least 1".into()));
        }
        if !self.similarity_threshold.is_finite()
            || !(-1.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(Error::Config(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }

    pub fn chunking(&self) -> Result<ChunkingConfig> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            top_k: self.top_k,
            similarity_threshold: self.similarity_threshold,
        }
    }
}
