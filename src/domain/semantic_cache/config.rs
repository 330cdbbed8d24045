//! Semantic cache configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::CacheError;

/// Similarity score a probe must reach for a similarity hit
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Environment variable consulted when no cache file is configured
pub const CACHE_FILE_ENV_VAR: &str = "SEMANTIC_CACHE_FILE";

/// Cache file used when neither the configuration nor the environment names one
pub const DEFAULT_CACHE_FILE: &str = "semantic_cache.bin";

/// Configuration for a cache engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfiguration {
    /// Explicit path of the persisted cache file
    #[serde(default)]
    pub cache_file: Option<PathBuf>,

    /// Similarity threshold for cache hits (0.0 to 1.0, inclusive)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Capacity used by `optimize_to_capacity`; no capacity when unset
    #[serde(default)]
    pub max_entries: Option<usize>,
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            cache_file: None,
            similarity_threshold: default_similarity_threshold(),
            max_entries: None,
        }
    }
}

impl CacheConfiguration {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache file path
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    /// Set the similarity threshold. Out-of-range values are rejected by `validate`.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the capacity used by automatic optimization
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Reject thresholds outside [0, 1]
    pub fn validate(&self) -> Result<(), CacheError> {
        let threshold = self.similarity_threshold;

        if !(0.0..=1.0).contains(&threshold) {
            return Err(CacheError::invalid_configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        Ok(())
    }

    /// Resolve the cache file against the given environment lookup
    pub fn resolve_cache_file<F>(&self, env_lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_path(
            self.cache_file.as_deref(),
            env_lookup,
            Path::new(DEFAULT_CACHE_FILE),
        )
    }
}

/// Resolve a cache path: explicit argument, then `SEMANTIC_CACHE_FILE`, then `default`.
///
/// Empty values count as absent at every tier.
pub fn resolve_path<F>(explicit: Option<&Path>, env_lookup: F, default: &Path) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return path.to_path_buf();
    }

    if let Some(value) = env_lookup(CACHE_FILE_ENV_VAR).filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(value);
    }

    default.to_path_buf()
}
