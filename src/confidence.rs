use crate::{
    embedding::{Embedder, cosine_similarity},
    error::Result,
    search::SearchResult,
};

/// Round to 4 decimal places.
pub fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

/// Estimate how well `results` cover `query`.
///
/// The score averages two signals: the mean similarity of the retrieved
/// chunks, and the cosine between the query and the concatenated chunk
/// text. Empty context scores exactly 0.0.
pub fn confidence<E: Embedder + ?Sized>(
    embedder: &mut E,
    query: &str,
    results: &[SearchResult],
) -> Result<f32> {
    if results.is_empty() {
        return Ok(0.0);
    }

    let avg_sim = results.iter().map(|r| r.similarity).sum::<f32>()
        / results.len() as f32;

    let joined = results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let vectors = embedder.encode(&[query.to_string(), joined])?;
    let cross_sim = match vectors.as_slice() {
        [q, c] => cosine_similarity(q, c),
        _ => 0.0,
    };

    let score = round4((avg_sim + cross_sim) / 2.0);
    tracing::info!(
        confidence = score,
        avg_sim,
        cross_sim,
        "estimated confidence"
    );
    Ok(score)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proptest::prelude::*;

    use super::*;
    use crate::embedding::HashEmbedder;

    fn result(text: &str, similarity: f32) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            source: PathBuf::from("a.txt"),
            page: 1,
            similarity,
        }
    }

    #[test]
    fn empty_context_is_zero() {
        let mut embedder = HashEmbedder::default();
        assert_eq!(confidence(&mut embedder, "anything", &[]).unwrap(), 0.0);
    }

    #[test]
    fn identical_text_averages_with_one() {
        let mut embedder = HashEmbedder::default();
        let score = confidence(
            &mut embedder,
            "welding requirements",
            &[result("welding requirements", 0.8)],
        )
        .unwrap();
        assert!((score - 0.9).abs() < 1e-4);
    }

    #[test]
    fn rounds_to_four_places() {
        assert_eq!(round4(0.123_456), 0.1235);
        assert_eq!(round4(-0.5), -0.5);
    }

    proptest! {
        #[test]
        fn stays_within_similarity_bounds(
            sims in proptest::collection::vec(-1.0f32..=1.0, 1..8),
            query in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
        ) {
            let mut embedder = HashEmbedder::default();
            let results: Vec<SearchResult> = sims
                .iter()
                .map(|s| result("some chunk text", *s))
                .collect();
            let score = confidence(&mut embedder, &query, &results).unwrap();
            prop_assert!((-1.0..=1.0).contains(&score));
        }

        #[test]
        fn non_negative_similarities_score_within_unit_interval(
            sims in proptest::collection::vec(0.0f32..=1.0, 1..8),
            query in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
            text in "[a-z]{1,8}( [a-z]{1,8}){0,10}",
        ) {
            let mut embedder = HashEmbedder::default();
            let results: Vec<SearchResult> =
                sims.iter().map(|s| result(&text, *s)).collect();
            let score = confidence(&mut embedder, &query, &results).unwrap();
            prop_assert!((0.0..=1.0).contains(&score), "score {score}");
        }
    }
}
