use std::path::{Path, PathBuf};

use crate::error::Result;

/// A discovered document file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the corpus root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path. Used as the chunk source.
    pub absolute_path: PathBuf,
}

/// Supported file extensions for document discovery.
///
/// Other formats must be converted to text first; a `pdftotext` dump
/// keeps its form feeds, which become page boundaries.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// Discover eligible documents under `root`.
///
/// `root` may be a directory, walked recursively, or a single supported
/// file. Hidden files and directories (names starting with `.`) are
/// skipped. Results are sorted by relative path so repeated runs over the
/// same tree produce the same order.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;

    if canonical_root.is_file() {
        if !is_supported(&canonical_root) {
            tracing::warn!(
                path = %canonical_root.display(),
                "unsupported document type"
            );
            return Ok(Vec::new());
        }
        let relative_path = canonical_root
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| canonical_root.clone());
        return Ok(vec![DiscoveredFile {
            relative_path,
            absolute_path: canonical_root,
        }]);
    }

    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();

        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                tracing::debug!(
                    path = %path.display(),
                    "skipping broken symlink"
                );
                continue;
            };
            // Directory links back into the tree would loop forever.
            if resolved.is_dir() {
                continue;
            }
            if resolved.is_file() && is_supported(&resolved) {
                results.push(discovered(root, &path, resolved));
            }
        } else if file_type.is_file() && is_supported(&path) {
            let absolute = path.canonicalize()?;
            results.push(discovered(root, &path, absolute));
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

fn discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path,
    }
}
