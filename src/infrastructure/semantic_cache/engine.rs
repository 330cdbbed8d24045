//! Cache engine: exact and similarity lookups over a persisted store

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::persistence::PersistenceManager;
use super::store::CacheStore;
use crate::domain::semantic_cache::{
    clamp_score, fingerprint, CacheConfiguration, CacheEntry, CacheHit, CacheStats, HitKind,
    SimilarityScorer, TokenCosineScorer,
};
use crate::domain::CacheError;

/// Hands out strictly increasing access timestamps
#[derive(Debug)]
struct AccessClock {
    last: Option<DateTime<Utc>>,
}

impl AccessClock {
    fn starting_after(last: Option<DateTime<Utc>>) -> Self {
        Self { last }
    }

    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

#[derive(Debug)]
struct EngineState {
    store: CacheStore,
    clock: AccessClock,
}

#[derive(Debug, Default)]
struct CacheCounters {
    exact_hits: AtomicU64,
    similarity_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    fn reset(&self) {
        self.exact_hits.store(0, Ordering::Relaxed);
        self.similarity_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Semantic result cache backed by a single file.
///
/// Lookups and every mutation take the exclusive side of one lock, since a
/// hit updates the entry's access bookkeeping. Stats, snapshots and JSON
/// exports share the read side.
pub struct CacheEngine {
    state: RwLock<EngineState>,
    scorer: Arc<dyn SimilarityScorer>,
    cache_file: PathBuf,
    similarity_threshold: f32,
    max_entries: Option<usize>,
    load_fallback: Option<String>,
    counters: CacheCounters,
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("cache_file", &self.cache_file)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("max_entries", &self.max_entries)
            .field("load_fallback", &self.load_fallback)
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Create an engine using the token cosine scorer
    pub fn new(config: CacheConfiguration) -> Result<Self, CacheError> {
        Self::with_scorer(config, Arc::new(TokenCosineScorer::new()))
    }

    /// Create an engine with a custom similarity scorer
    pub fn with_scorer(
        config: CacheConfiguration,
        scorer: Arc<dyn SimilarityScorer>,
    ) -> Result<Self, CacheError> {
        Self::with_env(config, scorer, |key| std::env::var(key).ok())
    }

    /// Create an engine resolving the cache file against `env_lookup`
    /// instead of the process environment
    pub fn with_env<F>(
        config: CacheConfiguration,
        scorer: Arc<dyn SimilarityScorer>,
        env_lookup: F,
    ) -> Result<Self, CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.validate()?;

        let cache_file = config.resolve_cache_file(env_lookup);
        let outcome = PersistenceManager::load(&cache_file);
        let load_fallback = outcome.fallback_reason().map(str::to_string);
        let store = outcome.into_store();

        info!(
            "Semantic cache ready at {} with {} entries (threshold {})",
            cache_file.display(),
            store.len(),
            config.similarity_threshold
        );

        Ok(Self {
            state: RwLock::new(EngineState {
                clock: AccessClock::starting_after(store.newest_access()),
                store,
            }),
            scorer,
            cache_file,
            similarity_threshold: config.similarity_threshold,
            max_entries: config.max_entries,
            load_fallback,
            counters: CacheCounters::default(),
        })
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Why the cache file was discarded at construction, if it was
    pub fn load_fallback_reason(&self) -> Option<&str> {
        self.load_fallback.as_deref()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, EngineState>, CacheError> {
        self.state
            .read()
            .map_err(|e| CacheError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, EngineState>, CacheError> {
        self.state
            .write()
            .map_err(|e| CacheError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    /// Get the cached result for `query`, exact or similar
    pub fn get(&self, query: &str) -> Result<Option<String>, CacheError> {
        Ok(self.lookup(query)?.map(|hit| hit.result))
    }

    /// Look up `query` and report how it matched.
    ///
    /// Tries the fingerprint first, then scores every entry. The best score
    /// wins if it reaches the threshold (inclusive). Equal best scores go to
    /// the most recently accessed entry, then to the earliest inserted.
    pub fn lookup(&self, query: &str) -> Result<Option<CacheHit>, CacheError> {
        let key = fingerprint(query);

        if key.is_empty() {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let mut state = self.write_state()?;
        let EngineState { store, clock } = &mut *state;

        let (matched, kind) = if store.lookup_exact(&key).is_some() {
            (key, HitKind::Exact)
        } else {
            match self.best_match(store, query) {
                Some((candidate, score)) if score >= self.similarity_threshold => {
                    (candidate, HitKind::Similar { score })
                }
                best => {
                    debug!(
                        "Semantic cache miss for query: {} (best score {:.4})",
                        truncate(query),
                        best.map(|(_, score)| score).unwrap_or(0.0)
                    );
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        };

        let at = clock.tick();
        let Some(entry) = store.get_mut(&matched) else {
            return Err(CacheError::internal(format!(
                "fingerprint '{}' vanished during lookup",
                matched
            )));
        };
        entry.record_access(at);

        match kind {
            HitKind::Exact => {
                self.counters.exact_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Exact cache hit for query: {}", truncate(query));
            }
            HitKind::Similar { score } => {
                self.counters.similarity_hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Similarity cache hit ({:.4}) for query: {} -> {}",
                    score,
                    truncate(query),
                    truncate(entry.query())
                );
            }
        }

        Ok(Some(CacheHit {
            result: entry.result().to_string(),
            matched_query: entry.query().to_string(),
            kind,
        }))
    }

    fn best_match(&self, store: &CacheStore, query: &str) -> Option<(String, f32)> {
        let mut best: Option<(&str, &CacheEntry, f32)> = None;

        for (candidate, entry) in store.iterate() {
            let score = clamp_score(self.scorer.score(query, entry.query()));

            let better = match best {
                None => true,
                Some((_, current, best_score)) => {
                    score > best_score
                        || (score == best_score
                            && entry.last_accessed_at() > current.last_accessed_at())
                }
            };

            if better {
                best = Some((candidate, entry, score));
            }
        }

        best.map(|(candidate, _, score)| (candidate.to_string(), score))
    }

    /// Store `result` for `query`, overwriting any entry with the same
    /// fingerprint. Nothing is written to disk until `save_cache`.
    pub fn put(&self, query: &str, result: impl Into<String>) -> Result<(), CacheError> {
        let key = fingerprint(query);

        if key.is_empty() {
            return Err(CacheError::invalid_query("query must not be empty"));
        }

        let mut state = self.write_state()?;
        let at = state.clock.tick();
        let overwritten = state.store.insert(key, CacheEntry::new(query, result, at))?;

        debug!(
            "{} cache entry for query: {}",
            if overwritten { "Updated" } else { "Stored" },
            truncate(query)
        );

        Ok(())
    }

    /// Drop the entry for `query`; returns whether one existed
    pub fn remove(&self, query: &str) -> Result<bool, CacheError> {
        let key = fingerprint(query);
        let mut state = self.write_state()?;

        Ok(state.store.remove(&key).is_some())
    }

    /// Persist the whole cache to the configured file.
    ///
    /// On failure the in-memory entries are left as they are.
    pub fn save_cache(&self) -> Result<(), CacheError> {
        let state = self.write_state()?;

        PersistenceManager::save(&self.cache_file, &state.store).map_err(|e| {
            warn!("Failed to save semantic cache: {}", e);
            CacheError::from(e)
        })
    }

    /// Write a JSON export of every entry to `path`
    pub fn save_cache_json(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let state = self.read_state()?;

        PersistenceManager::export_json(path.as_ref(), &state.store)?;

        Ok(())
    }

    /// Evict least recently accessed entries until at most `max_entries`
    /// remain. Returns the number of evicted entries.
    pub fn optimize(&self, max_entries: usize) -> Result<usize, CacheError> {
        let mut state = self.write_state()?;
        let total = state.store.len();

        if total <= max_entries {
            return Ok(0);
        }

        let excess = total - max_entries;
        let victims: Vec<String> = state
            .store
            .fingerprints_by_recency()
            .into_iter()
            .take(excess)
            .collect();

        for victim in &victims {
            state.store.remove(victim);
        }

        self.counters
            .evictions
            .fetch_add(excess as u64, Ordering::Relaxed);

        info!(
            "Optimized semantic cache: evicted {} entries, {} remain",
            excess,
            state.store.len()
        );

        Ok(excess)
    }

    /// Optimize down to the configured capacity; no-op without one
    pub fn optimize_to_capacity(&self) -> Result<usize, CacheError> {
        match self.max_entries {
            Some(max) => self.optimize(max),
            None => Ok(0),
        }
    }

    pub fn get_stats(&self) -> Result<CacheStats, CacheError> {
        let total_entries = self.read_state()?.store.len();
        let exact_hits = self.counters.exact_hits.load(Ordering::Relaxed);
        let similarity_hits = self.counters.similarity_hits.load(Ordering::Relaxed);

        Ok(CacheStats {
            total_entries,
            cache_file: self.cache_file.clone(),
            cache_size_bytes: PersistenceManager::file_size(&self.cache_file),
            similarity_threshold: self.similarity_threshold,
            hits: exact_hits + similarity_hits,
            exact_hits,
            similarity_hits,
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        })
    }

    /// Drop every entry, reset counters and delete the backing file
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.write_state()?;

        state.store.remove_all();
        self.counters.reset();
        PersistenceManager::delete(&self.cache_file)?;

        info!("Cleared semantic cache at {}", self.cache_file.display());

        Ok(())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.read_state()?.store.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.read_state()?.store.is_empty())
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let state = self.read_state()?;

        Ok(state.store.iterate().map(|(_, entry)| entry.clone()).collect())
    }
}

fn truncate(query: &str) -> &str {
    match query.char_indices().nth(50) {
        Some((idx, _)) => &query[..idx],
        None => query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::semantic_cache::{MockSimilarityScorer, CACHE_FILE_ENV_VAR};
    use crate::domain::PersistenceError;
    use std::fs;
    use tempfile::TempDir;

    const DEMO_QUERIES: [(&str, &str); 5] = [
        ("SELECT * FROM users WHERE age > 25", "Found 42 users older than 25"),
        (
            "SELECT name, email FROM customers WHERE city = 'New York'",
            "NYC customers: Alice, Bob, Charlie",
        ),
        (
            "SELECT COUNT(*) FROM orders WHERE status = 'pending'",
            "Pending orders: 15",
        ),
        (
            "SELECT product_name FROM inventory WHERE stock < 10",
            "Low stock items: Widget A, Gadget B",
        ),
        (
            "SELECT AVG(price) FROM products WHERE category = 'electronics'",
            "Average electronics price: $299.99",
        ),
    ];

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn config_in(dir: &TempDir) -> CacheConfiguration {
        CacheConfiguration::new().with_cache_file(dir.path().join("cache.bin"))
    }

    fn engine_in(dir: &TempDir) -> CacheEngine {
        CacheEngine::with_env(config_in(dir), Arc::new(TokenCosineScorer::new()), no_env).unwrap()
    }

    fn engine_with_score(dir: &TempDir, threshold: f32, score: f32) -> CacheEngine {
        let mut scorer = MockSimilarityScorer::new();
        scorer.expect_score().returning(move |_, _| score);

        CacheEngine::with_env(
            config_in(dir).with_similarity_threshold(threshold),
            Arc::new(scorer),
            no_env,
        )
        .unwrap()
    }

    fn next_below(value: f32) -> f32 {
        f32::from_bits(value.to_bits() - 1)
    }

    #[test]
    fn test_put_then_get_exact() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine.put("SELECT 1", "test result").unwrap();

        assert_eq!(engine.get("SELECT 1").unwrap().as_deref(), Some("test result"));

        let hit = engine.lookup("  select 1 ").unwrap().unwrap();
        assert!(hit.is_exact());
        assert_eq!(hit.matched_query, "SELECT 1");
    }

    #[test]
    fn test_put_rejects_blank_query() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let result = engine.put("   ", "nothing");

        assert!(matches!(result, Err(CacheError::InvalidQuery { .. })));
        assert_eq!(engine.len().unwrap(), 0);
        assert_eq!(engine.get("").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites_same_fingerprint() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine.put("SELECT COUNT(*) FROM orders", "10").unwrap();
        let created = engine.entries().unwrap()[0].created_at();
        engine.put("select count(*)   from ORDERS", "11").unwrap();

        let entries = engine.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].result(), "11");
        assert_eq!(entries[0].created_at(), created);
        assert!(entries[0].last_accessed_at() > created);
    }

    #[test]
    fn test_similarity_hit_with_token_scorer() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put(DEMO_QUERIES[0].0, DEMO_QUERIES[0].1).unwrap();

        let hit = engine
            .lookup("SELECT * FROM users WHERE age >= 26")
            .unwrap()
            .unwrap();

        assert_eq!(hit.result, DEMO_QUERIES[0].1);
        assert!(matches!(hit.kind, HitKind::Similar { score } if score >= 0.8));
        assert_eq!(engine.get("Show me users older than 25").unwrap(), None);

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.similarity_hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_score(&dir, 0.8, 0.8);
        engine.put("stored query", "cached").unwrap();

        assert_eq!(engine.get("probe").unwrap().as_deref(), Some("cached"));
    }

    #[test]
    fn test_just_below_threshold_misses() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_score(&dir, 0.8, next_below(0.8));
        engine.put("stored query", "cached").unwrap();

        assert_eq!(engine.get("probe").unwrap(), None);
    }

    #[test]
    fn test_nan_score_counts_as_zero() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_score(&dir, 0.5, f32::NAN);
        engine.put("stored query", "cached").unwrap();

        assert_eq!(engine.get("probe").unwrap(), None);
    }

    #[test]
    fn test_exact_match_skips_scorer() {
        let dir = TempDir::new().unwrap();
        let mut scorer = MockSimilarityScorer::new();
        scorer.expect_score().never();

        let engine =
            CacheEngine::with_env(config_in(&dir), Arc::new(scorer), no_env).unwrap();
        engine.put("SELECT 1", "1").unwrap();

        assert_eq!(engine.get("select 1").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_tie_break_prefers_most_recently_accessed() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_score(&dir, 0.5, 0.9);

        engine.put("first", "1").unwrap();
        engine.put("second", "2").unwrap();
        assert_eq!(engine.get("probe").unwrap().as_deref(), Some("2"));

        engine.get("first").unwrap();
        assert_eq!(engine.get("probe").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_tie_break_falls_back_to_insertion_order() {
        let dir = TempDir::new().unwrap();
        let stamped = Utc::now();
        let mut store = CacheStore::new();
        for query in ["a", "b", "c", "d"] {
            let entry = CacheEntry::new(query, format!("{query} result"), stamped);
            store.insert(fingerprint(query), entry).unwrap();
        }
        PersistenceManager::save(&dir.path().join("cache.bin"), &store).unwrap();

        let engine = engine_with_score(&dir, 0.5, 0.9);
        assert_eq!(engine.len().unwrap(), 4);

        let hit = engine.lookup("unrelated").unwrap().unwrap();
        assert_eq!(hit.matched_query, "a");
        assert_eq!(hit.result, "a result");

        // b and c now share the oldest access time; insertion order decides
        assert_eq!(engine.optimize(2).unwrap(), 2);
        let remaining: Vec<String> = engine
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.query().to_string())
            .collect();
        assert_eq!(remaining, vec!["a", "d"]);
    }

    #[test]
    fn test_hits_update_access_bookkeeping() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_score(&dir, 0.5, 0.9);
        engine.put("stored", "r").unwrap();
        let before = engine.entries().unwrap()[0].clone();

        engine.get("stored").unwrap();
        engine.get("similar probe").unwrap();

        let after = &engine.entries().unwrap()[0];
        assert_eq!(after.access_count(), 2);
        assert!(after.last_accessed_at() > before.last_accessed_at());
        assert_eq!(after.created_at(), before.created_at());

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.similarity_hits, 1);
    }

    #[test]
    fn test_optimize_keeps_most_recently_accessed() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        for (query, result) in DEMO_QUERIES {
            engine.put(query, result).unwrap();
        }

        // touch 0, 3, 1 in that order; 2 and 4 are left behind
        for i in [0, 3, 1] {
            assert!(engine.get(DEMO_QUERIES[i].0).unwrap().is_some());
        }

        let evicted = engine.optimize(3).unwrap();
        assert_eq!(evicted, 2);

        let remaining: Vec<String> = engine
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.query().to_string())
            .collect();
        assert_eq!(
            remaining,
            vec![DEMO_QUERIES[0].0, DEMO_QUERIES[1].0, DEMO_QUERIES[3].0]
        );
        assert_eq!(engine.get_stats().unwrap().evictions, 2);
    }

    #[test]
    fn test_optimize_noop_when_within_capacity() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put("a", "1").unwrap();
        engine.put("b", "2").unwrap();

        assert_eq!(engine.optimize(2).unwrap(), 0);
        assert_eq!(engine.optimize(10).unwrap(), 0);
        assert_eq!(engine.len().unwrap(), 2);
    }

    #[test]
    fn test_optimize_to_zero_empties_cache() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put("a", "1").unwrap();

        assert_eq!(engine.optimize(0).unwrap(), 1);
        assert!(engine.is_empty().unwrap());
    }

    #[test]
    fn test_optimize_to_capacity() {
        let dir = TempDir::new().unwrap();
        let engine = CacheEngine::with_env(
            config_in(&dir).with_max_entries(2),
            Arc::new(TokenCosineScorer::new()),
            no_env,
        )
        .unwrap();

        for (query, result) in DEMO_QUERIES {
            engine.put(query, result).unwrap();
        }

        assert_eq!(engine.optimize_to_capacity().unwrap(), 3);
        assert_eq!(engine.len().unwrap(), 2);

        let unbounded = engine_in(&TempDir::new().unwrap());
        unbounded.put("a", "1").unwrap();
        assert_eq!(unbounded.optimize_to_capacity().unwrap(), 0);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let first = engine_in(&dir);

        for (query, result) in DEMO_QUERIES {
            first.put(query, result).unwrap();
        }
        first.get(DEMO_QUERIES[2].0).unwrap();
        first.save_cache().unwrap();
        let saved = first.entries().unwrap();
        drop(first);

        let second = engine_in(&dir);
        assert!(second.load_fallback_reason().is_none());
        assert_eq!(second.entries().unwrap(), saved);
        assert_eq!(second.get_stats().unwrap().total_entries, DEMO_QUERIES.len());

        for (query, result) in DEMO_QUERIES {
            assert_eq!(second.get(query).unwrap().as_deref(), Some(result));
        }
    }

    #[test]
    fn test_reloaded_engine_stamps_after_loaded_entries() {
        let dir = TempDir::new().unwrap();
        let first = engine_in(&dir);
        first.put("a", "1").unwrap();
        first.save_cache().unwrap();
        let loaded_at = first.entries().unwrap()[0].last_accessed_at();

        let second = engine_in(&dir);
        second.put("b", "2").unwrap();

        assert!(second.entries().unwrap()[1].last_accessed_at() > loaded_at);
    }

    #[test]
    fn test_corrupted_file_starts_cold() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cache.bin"), "This is not a valid cache file").unwrap();

        let engine = engine_in(&dir);

        assert_eq!(engine.get_stats().unwrap().total_entries, 0);
        assert!(engine.load_fallback_reason().is_some());

        engine.put("SELECT 1", "1").unwrap();
        engine.save_cache().unwrap();
        assert_eq!(engine_in(&dir).len().unwrap(), 1);
    }

    #[test]
    fn test_missing_file_is_a_cold_start() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.cache_size_bytes, 0);
        assert_eq!(stats.cache_file, dir.path().join("cache.bin"));
        assert!(engine.load_fallback_reason().is_none());
    }

    #[test]
    fn test_stats_report_file_size() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put("SELECT 1", "1").unwrap();

        assert_eq!(engine.get_stats().unwrap().cache_size_bytes, 0);

        engine.save_cache().unwrap();

        let on_disk = fs::metadata(dir.path().join("cache.bin")).unwrap().len();
        assert_eq!(engine.get_stats().unwrap().cache_size_bytes, on_disk);
    }

    #[test]
    fn test_failed_save_keeps_memory() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfiguration::new()
            .with_cache_file(dir.path().join("missing").join("cache.bin"));
        let engine =
            CacheEngine::with_env(config, Arc::new(TokenCosineScorer::new()), no_env).unwrap();

        engine.put("SELECT 1", "1").unwrap();
        let result = engine.save_cache();

        assert!(matches!(
            result,
            Err(CacheError::Persistence(PersistenceError::InvalidPath { .. }))
        ));
        assert_eq!(engine.get("SELECT 1").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_clear_removes_file_and_entries() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put("SELECT 1", "1").unwrap();
        engine.get("SELECT 1").unwrap();
        engine.save_cache().unwrap();

        engine.clear().unwrap();

        let stats = engine.get_stats().unwrap();
        assert!(!dir.path().join("cache.bin").exists());
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.cache_size_bytes, 0);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_clear_without_file_succeeds() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine.clear().unwrap();
        assert!(engine.is_empty().unwrap());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put("SELECT 1", "1").unwrap();

        assert!(engine.remove("select 1").unwrap());
        assert!(!engine.remove("select 1").unwrap());
        assert!(engine.is_empty().unwrap());
    }

    #[test]
    fn test_save_cache_json() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.put("SELECT 1", "1").unwrap();

        let export = dir.path().join("cache.json");
        engine.save_cache_json(&export).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&export).unwrap()).unwrap();
        assert_eq!(value["entries"][0]["query"], "SELECT 1");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        let result = CacheEngine::with_env(
            config_in(&dir).with_similarity_threshold(1.5),
            Arc::new(TokenCosineScorer::new()),
            no_env,
        );

        assert!(matches!(result, Err(CacheError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_cache_file_from_environment() {
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("env_cache.bin");
        let env_value = env_path.to_string_lossy().into_owned();

        let engine = CacheEngine::with_env(
            CacheConfiguration::new(),
            Arc::new(TokenCosineScorer::new()),
            move |key| (key == CACHE_FILE_ENV_VAR).then(|| env_value.clone()),
        )
        .unwrap();

        assert_eq!(engine.cache_file(), env_path.as_path());

        engine.put("SELECT 1", "test result").unwrap();
        engine.save_cache().unwrap();
        assert!(env_path.exists());
    }

    #[test]
    fn test_concurrent_access() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine_in(&dir));

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let engine = Arc::clone(&engine);
                scope.spawn(move || {
                    for i in 0..25 {
                        let query = format!("SELECT {} FROM worker_{}", i, worker);
                        engine.put(&query, i.to_string()).unwrap();
                        assert_eq!(engine.get(&query).unwrap(), Some(i.to_string()));
                    }
                });
            }
        });

        assert_eq!(engine.len().unwrap(), 100);
        assert_eq!(engine.get_stats().unwrap().exact_hits, 100);
    }

    #[test]
    fn test_full_lifecycle() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache.bin");

        let first = engine_in(&dir);
        for (query, result) in DEMO_QUERIES {
            first.put(query, result).unwrap();
        }
        first.save_cache().unwrap();
        assert!(cache_path.exists());
        drop(first);

        let second = engine_in(&dir);
        assert_eq!(second.get_stats().unwrap().total_entries, 5);

        for (query, result) in DEMO_QUERIES {
            assert_eq!(second.get(query).unwrap().as_deref(), Some(result));
        }

        // the last three lookups are the most recent
        second.optimize(3).unwrap();
        let kept: Vec<String> = second
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.query().to_string())
            .collect();
        assert_eq!(
            kept,
            vec![DEMO_QUERIES[2].0, DEMO_QUERIES[3].0, DEMO_QUERIES[4].0]
        );

        second.clear().unwrap();
        assert!(!cache_path.exists());
        assert_eq!(second.get_stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(80);
        assert_eq!(truncate(&long).chars().count(), 50);
        assert_eq!(truncate("short"), "short");
    }
}
