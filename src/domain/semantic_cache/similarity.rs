//! Query similarity scoring

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

/// Scores how alike two query strings are.
///
/// Implementations must be pure and total: the same inputs always give the
/// same score, and scoring never fails or blocks.
#[cfg_attr(test, automock)]
pub trait SimilarityScorer: Send + Sync {
    /// Similarity in [0, 1]; 1 means interchangeable
    fn score(&self, query_a: &str, query_b: &str) -> f32;
}

/// Bag-of-words scorer: cosine similarity of the term-frequency vectors of
/// the lower-cased alphanumeric tokens of each query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCosineScorer;

impl TokenCosineScorer {
    pub fn new() -> Self {
        Self
    }

    fn tokens(query: &str) -> impl Iterator<Item = String> + '_ {
        query
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
    }
}

impl SimilarityScorer for TokenCosineScorer {
    fn score(&self, query_a: &str, query_b: &str) -> f32 {
        let mut counts: BTreeMap<String, (f32, f32)> = BTreeMap::new();

        for token in Self::tokens(query_a) {
            counts.entry(token).or_default().0 += 1.0;
        }
        for token in Self::tokens(query_b) {
            counts.entry(token).or_default().1 += 1.0;
        }

        let (a, b): (Vec<f32>, Vec<f32>) = counts.into_values().unzip();

        clamp_score(cosine_similarity(&a, &b))
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Force a scorer output into [0, 1]; NaN scores count as no similarity
pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        return 0.0;
    }

    score.clamp(0.0, 1.0)
}
