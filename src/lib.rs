//! Semantic query cache
//!
//! Caches results of natural-language or SQL queries with:
//! - Exact lookups on a normalized query fingerprint
//! - Similarity lookups through a pluggable scorer
//! - Durable persistence that survives restarts and tolerates corrupt files
//! - LRU optimization down to a target size

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::semantic_cache::{
    CacheConfiguration, CacheEntry, CacheHit, CacheStats, HitKind, SimilarityScorer,
    TokenCosineScorer,
};
pub use domain::{CacheError, PersistenceError};
pub use infrastructure::semantic_cache::{CacheEngine, CacheStore, LoadOutcome, PersistenceManager};
pub use infrastructure::services::QueryCacheService;
