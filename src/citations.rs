use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::search::SearchResult;

/// Citations shown to a user by default.
pub const DEFAULT_CITATION_DISPLAY_LIMIT: usize = 5;

/// A source document backing an answer, with its best chunk similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source: PathBuf,
    pub similarity: f32,
}

impl Citation {
    /// Final path component, for display.
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// One citation per distinct source, keeping each source's highest
/// similarity, best first. Sources with equal scores keep the order in
/// which they first appear in `results`.
///
/// # Examples
///
/// ```
/// use ragindex::{citations::select_citations, search::SearchResult};
///
/// let hit = |source: &str, similarity| SearchResult {
///     text: String::new(),
///     source: source.into(),
///     page: 1,
///     similarity,
/// };
/// let citations = select_citations(&[
///     hit("a.pdf", 0.9),
///     hit("b.pdf", 0.8),
///     hit("a.pdf", 0.6),
/// ]);
/// assert_eq!(citations.len(), 2);
/// assert_eq!(citations[0].similarity, 0.9);
/// ```
pub fn select_citations(results: &[SearchResult]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();
    let mut by_source: HashMap<&Path, usize> = HashMap::new();

    for result in results {
        match by_source.get(result.source.as_path()) {
            Some(&i) => {
                let existing = &mut citations[i];
                existing.similarity =
                    existing.similarity.max(result.similarity);
            }
            None => {
                by_source.insert(result.source.as_path(), citations.len());
                citations.push(Citation {
                    source: result.source.clone(),
                    similarity: result.similarity,
                });
            }
        }
    }

    citations.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    citations
}

/// Display lines for the first `limit` citations: file name and
/// similarity to 3 decimals.
pub fn format_citations(citations: &[Citation], limit: usize) -> Vec<String> {
    citations
        .iter()
        .take(limit)
        .map(|c| format!("{} ({:.3})", c.file_name(), c.similarity))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn hit(source: &str, similarity: f32) -> SearchResult {
        SearchResult {
            text: format!("chunk from {source}"),
            source: PathBuf::from(source),
            page: 1,
            similarity,
        }
    }

    #[test]
    fn keeps_max_similarity_per_source() {
        let citations =
            select_citations(&[
                hit("a.pdf", 0.9),
                hit("a.pdf", 0.6),
                hit("b.pdf", 0.8),
            ]);
        assert_eq!(
            citations,
            vec![
                Citation {
                    source: PathBuf::from("a.pdf"),
                    similarity: 0.9
                },
                Citation {
                    source: PathBuf::from("b.pdf"),
                    similarity: 0.8
                },
            ]
        );
    }

    #[test]
    fn later_higher_score_wins() {
        let citations =
            select_citations(&[
                hit("a.pdf", 0.4),
                hit("b.pdf", 0.5),
                hit("a.pdf", 0.7),
            ]);
        assert_eq!(citations[0].source, PathBuf::from("a.pdf"));
        assert_eq!(citations[0].similarity, 0.7);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let citations =
            select_citations(&[
                hit("z.pdf", 0.5),
                hit("a.pdf", 0.5),
                hit("m.pdf", 0.5),
            ]);
        let names: Vec<String> =
            citations.iter().map(Citation::file_name).collect();
        assert_eq!(names, vec!["z.pdf", "a.pdf", "m.pdf"]);
    }

    #[test]
    fn empty_results_no_citations() {
        assert!(select_citations(&[]).is_empty());
    }

    #[test]
    fn formats_file_name_and_three_decimals() {
        let citations =
            select_citations(&[hit("/docs/manuals/pump.pdf", 0.87654)]);
        assert_eq!(
            format_citations(&citations, DEFAULT_CITATION_DISPLAY_LIMIT),
            vec!["pump.pdf (0.877)"]
        );
    }

    #[test]
    fn display_limit_truncates() {
        let results: Vec<SearchResult> = (0..8)
            .map(|i| hit(&format!("doc{i}.pdf"), 0.9 - i as f32 * 0.05))
            .collect();
        let citations = select_citations(&results);
        assert_eq!(citations.len(), 8);
        assert_eq!(
            format_citations(&citations, DEFAULT_CITATION_DISPLAY_LIMIT).len(),
            5
        );
    }

    proptest! {
        #[test]
        fn one_citation_per_source_with_its_max(
            hits in proptest::collection::vec(
                (0usize..5, -1.0f32..=1.0),
                0..30,
            ),
        ) {
            let results: Vec<SearchResult> = hits
                .iter()
                .map(|(doc, sim)| hit(&format!("doc{doc}.pdf"), *sim))
                .collect();
            let citations = select_citations(&results);

            let unique: HashSet<&PathBuf> =
                citations.iter().map(|c| &c.source).collect();
            prop_assert_eq!(unique.len(), citations.len());

            for citation in &citations {
                let best = results
                    .iter()
                    .filter(|r| r.source == citation.source)
                    .map(|r| r.similarity)
                    .fold(f32::NEG_INFINITY, f32::max);
                prop_assert_eq!(citation.similarity, best);
            }
            prop_assert!(
                citations
                    .windows(2)
                    .all(|w| w[0].similarity >= w[1].similarity)
            );
        }
    }
}
