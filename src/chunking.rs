//! Chunking utilities for splitting documents into overlapping retrieval units.
//!
//! Every page of a [`SourceDocument`] is cut into sliding windows of
//! `chunk_size` characters, with `overlap` characters repeated at the start
//! of the next window. Window ends are pulled back to the nearest whitespace
//! when one is close enough, so words are rarely split in half.
//!
//! Chunking is deterministic: the same document and the same configuration
//! always produce the same chunks in the same order.

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    ingestion::SourceDocument,
};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// How far back from a window end we look for whitespace to break at.
const BOUNDARY_LOOKBACK: usize = 100;

/// Validated chunking parameters.
///
/// # Examples
///
/// ```
/// use ragindex::chunking::ChunkingConfig;
///
/// let config = ChunkingConfig::new(800, 150).unwrap();
/// assert_eq!(config.step(), 650);
///
/// // Overlap must be strictly smaller than the chunk size.
/// assert!(ChunkingConfig::new(100, 100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance in characters between the starts of adjacent windows.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A bounded span of source-document text, the atomic retrieval unit.
///
/// Identity is `(source, page, ordinal)`, where `ordinal` is the position
/// of the chunk among all chunks of the same source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    text: String,
    source: PathBuf,
    page: u32,
    ordinal: usize,
}

impl Chunk {
    /// Create a chunk, rejecting blank text, empty sources and page 0.
    pub fn new(
        text: impl Into<String>,
        source: impl Into<PathBuf>,
        page: u32,
        ordinal: usize,
    ) -> Result<Self> {
        let text = text.into();
        let source = source.into();

        if text.trim().is_empty() {
            return Err(Error::InvalidChunk(format!(
                "blank text for {} page {page}",
                source.display()
            )));
        }
        if source.as_os_str().is_empty() {
            return Err(Error::InvalidChunk("empty source path".into()));
        }
        if page == 0 {
            return Err(Error::InvalidChunk(format!(
                "page numbers are 1-based, got 0 for {}",
                source.display()
            )));
        }

        Ok(Self {
            text,
            source,
            page,
            ordinal,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// A window of a single text, produced by [`chunk_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// The window text.
    pub text: String,
    /// Zero-based window index within the text.
    pub index: usize,
    /// Byte offset where this window starts in the original text.
    pub start_offset: usize,
}

/// Split text into overlapping windows.
///
/// `chunk_size` and `overlap` are counted in characters, not bytes, so
/// multi-byte UTF-8 text is never cut mid-character. Blank windows are
/// dropped; blank input yields no windows at all.
///
/// # Examples
///
/// ```
/// use ragindex::chunking::chunk_text;
///
/// let windows = chunk_text("Hello, world!", 800, 150);
/// assert_eq!(windows.len(), 1);
/// assert_eq!(windows[0].text, "Hello, world!");
///
/// let text = "word ".repeat(500);
/// let windows = chunk_text(&text, 800, 150);
/// assert!(windows.len() >= 3);
/// ```
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<TextWindow> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let char_count = text.chars().count();
    if char_count <= chunk_size {
        return vec![TextWindow {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
        }];
    }

    // char index -> byte index, with a trailing entry for text.len()
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let step = chunk_size.saturating_sub(overlap).max(1);
    // Never pull an end back past the next window's start, or text between
    // the two would be lost.
    let lookback = BOUNDARY_LOOKBACK.min(overlap);

    let mut windows = Vec::new();
    let mut start_char = 0;

    while start_char < char_count {
        let end_char = (start_char + chunk_size).min(char_count);
        let window_end = if end_char < char_count {
            find_word_boundary(
                text,
                &char_to_byte,
                start_char,
                end_char,
                lookback,
            )
        } else {
            end_char
        };

        let start_byte = char_to_byte[start_char];
        let end_byte = char_to_byte[window_end];
        let slice = &text[start_byte..end_byte];

        if !slice.trim().is_empty() {
            windows.push(TextWindow {
                text: slice.to_string(),
                index: windows.len(),
                start_offset: start_byte,
            });
        }

        if end_char >= char_count {
            break;
        }
        start_char += step;
    }

    windows
}

/// Find a break point at or before `end_char`, just after the last
/// whitespace within `lookback` characters. Falls back to `end_char`.
fn find_word_boundary(
    text: &str,
    char_to_byte: &[usize],
    start_char: usize,
    end_char: usize,
    lookback: usize,
) -> usize {
    let search_start = end_char.saturating_sub(lookback).max(start_char + 1);
    if search_start >= end_char {
        return end_char;
    }

    let region_start = char_to_byte[search_start];
    let region = &text[region_start..char_to_byte[end_char]];

    match region.rfind(char::is_whitespace) {
        Some(ws_offset) => {
            let ws_byte = region_start + ws_offset;
            // First char that starts after the whitespace.
            char_to_byte.partition_point(|&b| b <= ws_byte)
        }
        None => end_char,
    }
}

/// Chunk one document page by page.
///
/// Page numbers are 1-based and follow the document's page list; empty
/// pages produce no chunks but still advance the page counter. Ordinals
/// run across the whole document.
pub fn chunk_document(
    document: &SourceDocument,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for (page_idx, page_text) in document.pages().iter().enumerate() {
        let page = u32::try_from(page_idx + 1).map_err(|_| {
            Error::InvalidChunk(format!(
                "{} has too many pages",
                document.path().display()
            ))
        })?;

        for window in chunk_text(page_text, config.chunk_size, config.overlap)
        {
            chunks.push(Chunk::new(
                window.text,
                document.path(),
                page,
                chunks.len(),
            )?);
        }
    }

    Ok(chunks)
}

/// Chunk a list of documents, preserving document order.
pub fn chunk_documents(
    documents: &[SourceDocument],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    let mut all = Vec::new();
    for document in documents {
        let chunks = chunk_document(document, config)?;
        tracing::debug!(
            path = %document.path().display(),
            pages = document.pages().len(),
            chunks = chunks.len(),
            "chunked document"
        );
        all.extend(chunks);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn short_text_single_window() {
        let windows = chunk_text(
            "Hello, world!",
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
        );
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "Hello, world!");
        assert_eq!(windows[0].index, 0);
        assert_eq!(windows[0].start_offset, 0);
    }

    #[test]
    fn blank_text_has_no_windows() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n\t  ", 100, 10).is_empty());
    }

    #[test]
    fn long_text_overlapping_windows() {
        let text = "word ".repeat(500); // 2500 chars
        let windows = chunk_text(&text, 800, 150);

        assert!(windows.len() >= 3);
        for pair in windows.windows(2) {
            let first_end = pair[0].start_offset + pair[0].text.len();
            assert!(
                pair[1].start_offset < first_end,
                "windows should overlap"
            );
        }
    }

    #[test]
    fn exact_sliding_window_without_whitespace() {
        let text = "a".repeat(1000);
        let windows = chunk_text(&text, 400, 100);

        let starts: Vec<usize> =
            windows.iter().map(|w| w.start_offset).collect();
        assert_eq!(starts, vec![0, 300, 600]);
        assert!(windows.iter().all(|w| w.text.len() <= 400));
        assert_eq!(windows.last().unwrap().text.len(), 400);
    }

    #[test]
    fn windows_cover_full_text() {
        let text = "lorem ipsum dolor sit amet ".repeat(120);
        let windows = chunk_text(&text, 300, 40);

        assert_eq!(windows[0].start_offset, 0);
        let last = windows.last().unwrap();
        assert_eq!(last.start_offset + last.text.len(), text.len());
    }

    #[test]
    fn zero_overlap_leaves_no_gaps() {
        let text = "alpha beta gamma delta ".repeat(80);
        let windows = chunk_text(&text, 250, 0);

        for pair in windows.windows(2) {
            let first_end = pair[0].start_offset + pair[0].text.len();
            assert_eq!(first_end, pair[1].start_offset);
        }
    }

    #[test]
    fn handles_multibyte_chars() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(50);
        let windows = chunk_text(&text, 100, 20);

        assert!(!windows.is_empty());
        for window in &windows {
            assert!(window.text.chars().count() <= 100);
        }
    }

    #[test]
    fn config_rejects_overlap_not_below_size() {
        assert!(ChunkingConfig::new(100, 99).is_ok());
        assert!(matches!(
            ChunkingConfig::new(100, 100),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ChunkingConfig::new(100, 250),
            Err(Error::Config(_))
        ));
        assert!(matches!(ChunkingConfig::new(0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn default_config_matches_tuning() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_size(), 800);
        assert_eq!(config.overlap(), 150);
    }

    #[test]
    fn chunk_validation() {
        assert!(Chunk::new("text", "a.txt", 1, 0).is_ok());
        assert!(matches!(
            Chunk::new("text", "a.txt", 0, 0),
            Err(Error::InvalidChunk(_))
        ));
        assert!(matches!(
            Chunk::new("  ", "a.txt", 1, 0),
            Err(Error::InvalidChunk(_))
        ));
        assert!(matches!(
            Chunk::new("text", "", 1, 0),
            Err(Error::InvalidChunk(_))
        ));
    }

    #[test]
    fn document_chunks_carry_pages_and_ordinals() {
        let doc = SourceDocument::from_text(
            "manual.txt",
            "first page text\x0c\x0cthird page text",
        );
        let chunks =
            chunk_document(&doc, &ChunkingConfig::default()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page(), 1);
        assert_eq!(chunks[0].ordinal(), 0);
        assert_eq!(chunks[1].page(), 3);
        assert_eq!(chunks[1].ordinal(), 1);
        assert_eq!(chunks[1].source(), Path::new("manual.txt"));
    }

    #[test]
    fn documents_without_page_markers_are_page_one() {
        let doc = SourceDocument::from_text("notes.md", "x ".repeat(1000));
        let config = ChunkingConfig::new(300, 50).unwrap();
        let chunks = chunk_document(&doc, &config).unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.page() == 1));
    }

    proptest! {
        #[test]
        fn chunking_is_deterministic(
            text in "[a-zé日 \n]{0,600}",
            size in 1usize..200,
            overlap_seed in 0usize..200,
        ) {
            let overlap = overlap_seed % size;
            let config = ChunkingConfig::new(size, overlap).unwrap();
            let doc = SourceDocument::from_text("doc.txt", text.clone());

            let first = chunk_document(&doc, &config).unwrap();
            let second = chunk_document(&doc, &config).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn windows_respect_size_and_leave_no_gaps(
            text in "[a-z]{1,8}( [a-z]{1,8}){0,80}",
            size in 2usize..150,
            overlap_seed in 0usize..150,
        ) {
            let overlap = overlap_seed % size;
            let windows = chunk_text(&text, size, overlap);

            for window in &windows {
                prop_assert!(window.text.chars().count() <= size);
            }
            for pair in windows.windows(2) {
                let first_end = pair[0].start_offset + pair[0].text.len();
                prop_assert!(pair[1].start_offset <= first_end);
            }
        }
    }
}
