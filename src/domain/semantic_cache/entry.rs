//! Cached query/result pairs

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A cached entry in the semantic cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The original query text
    query: String,
    /// The cached result payload
    result: String,
    /// When this entry was first stored
    created_at: DateTime<Utc>,
    /// When this entry was last stored or hit
    last_accessed_at: DateTime<Utc>,
    /// Number of cache hits
    access_count: u64,
}

impl CacheEntry {
    /// Create a new cached entry stamped with `now`
    pub fn new(query: impl Into<String>, result: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            query: query.into(),
            result: result.into(),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Deserialize a JSON result payload
    pub fn deserialize_result<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.result)
    }

    /// Record a hit at `at`
    pub(crate) fn record_access(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = self.last_accessed_at.max(at);
    }

    /// Take over the result and access time of a newer entry for the same fingerprint.
    /// `created_at` and `access_count` are kept.
    pub(crate) fn overwrite_with(&mut self, newer: CacheEntry) {
        self.result = newer.result;
        self.last_accessed_at = self.created_at.max(newer.last_accessed_at);
    }

    /// Check the invariants a loaded entry must satisfy
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("entry has an empty query".to_string());
        }

        if self.created_at > self.last_accessed_at {
            return Err(format!(
                "entry '{}' was accessed before it was created",
                self.query
            ));
        }

        Ok(())
    }
}
