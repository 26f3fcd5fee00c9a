//! Cosine similarity and result ranking shared by every backend.

use super::types::SimilaritySearchResult;
use std::cmp::Ordering;

/// Cosine similarity of two vectors.
///
/// Returns `0.0` when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Descending similarity, then ascending sequence index, then ascending source name.
pub fn compare_results(a: &SimilaritySearchResult, b: &SimilaritySearchResult) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.chunk_ref.sequence_index.cmp(&b.chunk_ref.sequence_index))
        .then_with(|| a.chunk_ref.source_name.cmp(&b.chunk_ref.source_name))
}

/// Drop hits below `min_similarity`, order them, and keep at most `k`.
pub fn rank_results(
    mut results: Vec<SimilaritySearchResult>,
    k: usize,
    min_similarity: f64,
) -> Vec<SimilaritySearchResult> {
    // NaN never satisfies the comparison, so it is filtered here too.
    results.retain(|result| result.similarity >= min_similarity);
    results.sort_by(compare_results);
    results.truncate(k);
    results
}
