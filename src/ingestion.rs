use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{error::Result, walker::DiscoveredFile};

/// Page separator emitted by `pdftotext` and most text extractors.
pub const PAGE_BREAK: char = '\x0c';

/// Extracted text of one source document, split into pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    path: PathBuf,
    pages: Vec<String>,
}

impl SourceDocument {
    /// Build a document from raw text, splitting pages on form feeds.
    ///
    /// Text without any form feed is a single page.
    ///
    /// # Examples
    ///
    /// ```
    /// use ragindex::ingestion::SourceDocument;
    ///
    /// let doc = SourceDocument::from_text("report.txt", "one\x0ctwo");
    /// assert_eq!(doc.pages(), ["one", "two"]);
    /// ```
    pub fn from_text(path: impl Into<PathBuf>, text: impl AsRef<str>) -> Self {
        let pages = text
            .as_ref()
            .split(PAGE_BREAK)
            .map(str::to_string)
            .collect();
        Self {
            path: path.into(),
            pages,
        }
    }

    /// Build a document from pages supplied by an external parser.
    pub fn from_pages(path: impl Into<PathBuf>, pages: Vec<String>) -> Self {
        Self {
            path: path.into(),
            pages,
        }
    }

    /// Read a UTF-8 text file from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(path, text))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }
}

/// Read discovered files into documents.
///
/// Files are read in parallel; the output keeps the input order. A file
/// that cannot be read or is not valid UTF-8 is skipped with a warning
/// rather than failing the whole run.
pub fn load_documents(files: &[DiscoveredFile]) -> Vec<SourceDocument> {
    let loaded: Vec<Option<SourceDocument>> = files
        .par_iter()
        .map(|file| match SourceDocument::read(&file.absolute_path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(
                    path = %file.absolute_path.display(),
                    error = %e,
                    "skipping unreadable document"
                );
                None
            }
        })
        .collect();

    let documents: Vec<SourceDocument> = loaded.into_iter().flatten().collect();
    tracing::info!(
        discovered = files.len(),
        loaded = documents.len(),
        "loaded source documents"
    );
    documents
}
