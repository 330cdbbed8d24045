//! Lookup results and cache statistics

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HitKind {
    /// Fingerprint equality
    Exact,
    /// Similarity score at or above the threshold
    Similar { score: f32 },
}

/// A successful cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// The cached result
    pub result: String,
    /// The stored query that matched
    pub matched_query: String,
    pub kind: HitKind,
}

impl CacheHit {
    pub fn is_exact(&self) -> bool {
        matches!(self.kind, HitKind::Exact)
    }
}

/// Statistics for the semantic cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of entries in memory
    pub total_entries: usize,
    /// Path of the persisted cache file
    pub cache_file: PathBuf,
    /// Size of the persisted file on disk, 0 when it does not exist
    pub cache_size_bytes: u64,
    /// Threshold used for similarity hits
    pub similarity_threshold: f32,
    /// Total cache hits
    pub hits: u64,
    /// Hits served by fingerprint equality
    pub exact_hits: u64,
    /// Hits served by similarity
    pub similarity_hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total entries evicted by optimization
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;

        if total == 0 {
            return 0.0;
        }

        self.hits as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert!((stats.hit_rate() - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_cache_stats_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_kind_serialization() {
        let json = serde_json::to_string(&HitKind::Similar { score: 0.5 }).unwrap();
        assert_eq!(json, r#"{"kind":"similar","score":0.5}"#);

        let json = serde_json::to_string(&HitKind::Exact).unwrap();
        assert_eq!(json, r#"{"kind":"exact"}"#);
    }
}
