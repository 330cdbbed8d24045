//! Query result caching service
//!
//! Async front for a shared [`CacheEngine`]: typed results, canonical SQL
//! keys, write-statement invalidation, and saves that run on the blocking
//! pool instead of the request path.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::semantic_cache::{CacheStats, HitKind};
use crate::domain::CacheError;
use crate::infrastructure::semantic_cache::CacheEngine;

/// Leading keywords of statements that change table contents or schema
const MUTATING_KEYWORDS: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE",
];

/// Cached query result with lookup metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQueryResult<T> {
    /// The cached value
    pub value: T,
    /// Stored query that satisfied the lookup
    pub matched_query: String,
    /// Exact or similarity hit
    pub kind: HitKind,
}

/// Query cache service sharing one engine between request handlers
#[derive(Debug, Clone)]
pub struct QueryCacheService {
    engine: Arc<CacheEngine>,
}

impl QueryCacheService {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    /// Canonical cache key for a statement: whitespace collapsed and trailing
    /// semicolons dropped
    pub fn canonical_query(sql: &str) -> String {
        sql.trim()
            .trim_end_matches(';')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether executing `sql` would make cached results stale
    pub fn is_mutating(sql: &str) -> bool {
        sql.split_whitespace()
            .next()
            .map(|keyword| {
                MUTATING_KEYWORDS
                    .iter()
                    .any(|candidate| keyword.eq_ignore_ascii_case(candidate))
            })
            .unwrap_or(false)
    }

    async fn run_blocking<R, F>(&self, task: F) -> Result<R, CacheError>
    where
        F: FnOnce(&CacheEngine) -> Result<R, CacheError> + Send + 'static,
        R: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || task(&engine))
            .await
            .map_err(|e| CacheError::internal(format!("Cache task failed: {}", e)))?
    }

    /// Cached raw result for `sql`
    pub async fn get(&self, sql: &str) -> Result<Option<String>, CacheError> {
        let key = Self::canonical_query(sql);

        self.run_blocking(move |engine| engine.get(&key)).await
    }

    /// Cache a raw result for `sql`
    pub async fn put(&self, sql: &str, result: impl Into<String>) -> Result<(), CacheError> {
        let key = Self::canonical_query(sql);
        let result = result.into();

        self.run_blocking(move |engine| engine.put(&key, result)).await
    }

    /// Try to get a cached, typed result for `sql`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        sql: &str,
    ) -> Result<Option<CachedQueryResult<T>>, CacheError> {
        let key = Self::canonical_query(sql);
        let hit = self.run_blocking(move |engine| engine.lookup(&key)).await?;

        let Some(hit) = hit else {
            return Ok(None);
        };

        let value = serde_json::from_str(&hit.result).map_err(|e| {
            CacheError::internal(format!("Failed to deserialize cached value: {}", e))
        })?;

        Ok(Some(CachedQueryResult {
            value,
            matched_query: hit.matched_query,
            kind: hit.kind,
        }))
    }

    /// Cache a typed result for `sql`
    pub async fn put_json<T: Serialize>(&self, sql: &str, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string(value).map_err(|e| {
            CacheError::internal(format!("Failed to serialize response for cache: {}", e))
        })?;

        self.put(sql, json).await
    }

    /// Invalidate the cache when `sql` writes data. Returns whether it did.
    pub async fn observe_statement(&self, sql: &str) -> Result<bool, CacheError> {
        if !Self::is_mutating(sql) {
            return Ok(false);
        }

        debug!("Write statement observed, invalidating query cache");
        self.invalidate_all().await?;

        Ok(true)
    }

    /// Invalidate all cached results, including the persisted file
    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.run_blocking(|engine| engine.clear()).await
    }

    /// Persist the cache and wait for the write to finish
    pub async fn save(&self) -> Result<(), CacheError> {
        self.run_blocking(|engine| engine.save_cache()).await
    }

    /// Start persisting the cache on the blocking pool without waiting
    pub fn save_in_background(&self) -> JoinHandle<Result<(), CacheError>> {
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || {
            let result = engine.save_cache();

            match &result {
                Ok(()) => info!("Background cache save finished"),
                Err(e) => warn!("Background cache save failed: {}", e),
            }

            result
        })
    }

    /// Drop the cached result for `sql`; returns whether one existed
    pub async fn remove(&self, sql: &str) -> Result<bool, CacheError> {
        let key = Self::canonical_query(sql);

        self.run_blocking(move |engine| engine.remove(&key)).await
    }

    /// Evict least recently used entries down to `max_entries`, or to the
    /// configured capacity when `None`. Returns the number evicted.
    pub async fn optimize(&self, max_entries: Option<usize>) -> Result<usize, CacheError> {
        self.run_blocking(move |engine| match max_entries {
            Some(max) => engine.optimize(max),
            None => engine.optimize_to_capacity(),
        })
        .await
    }

    /// Write a JSON export of the cache to `path`
    pub async fn export_json(&self, path: impl Into<PathBuf>) -> Result<(), CacheError> {
        let path = path.into();

        self.run_blocking(move |engine| engine.save_cache_json(&path)).await
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.run_blocking(|engine| engine.get_stats()).await
    }
}
