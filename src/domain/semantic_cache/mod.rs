//! Semantic cache domain models and traits
//!
//! Caches query results and matches new queries against stored ones either
//! by fingerprint or by similarity score.

mod config;
mod entry;
mod fingerprint;
mod similarity;
mod stats;

pub use config::{
    resolve_path, CacheConfiguration, CACHE_FILE_ENV_VAR, DEFAULT_CACHE_FILE,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use entry::CacheEntry;
pub use fingerprint::fingerprint;
pub use similarity::{clamp_score, cosine_similarity, SimilarityScorer, TokenCosineScorer};
pub use stats::{CacheHit, CacheStats, HitKind};

#[cfg(test)]
pub use similarity::MockSimilarityScorer;
