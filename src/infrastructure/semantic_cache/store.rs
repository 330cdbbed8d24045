//! In-memory cache store
//!
//! Entries are keyed by fingerprint and kept in insertion order. Each slot
//! carries a sequence number assigned on first insert; overwriting a
//! fingerprint keeps its slot.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::semantic_cache::CacheEntry;
use crate::domain::CacheError;

#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    slots: BTreeMap<u64, (String, CacheEntry)>,
    index: HashMap<String, u64>,
    next_seq: u64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.index.contains_key(fingerprint)
    }

    /// Insert or overwrite the entry for `fingerprint`.
    ///
    /// Overwriting keeps the stored query, `created_at`, hit count and
    /// insertion position; the result and access time come from `entry`.
    /// Returns `true` when an existing entry was overwritten.
    pub fn insert(&mut self, fingerprint: String, entry: CacheEntry) -> Result<bool, CacheError> {
        if fingerprint.is_empty() || entry.query().trim().is_empty() {
            return Err(CacheError::invalid_query("query must not be empty"));
        }

        if let Some(existing) = self.get_mut(&fingerprint) {
            existing.overwrite_with(entry);
            return Ok(true);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(fingerprint.clone(), seq);
        self.slots.insert(seq, (fingerprint, entry));

        Ok(false)
    }

    pub fn lookup_exact(&self, fingerprint: &str) -> Option<&CacheEntry> {
        let seq = self.index.get(fingerprint)?;
        self.slots.get(seq).map(|(_, entry)| entry)
    }

    pub(crate) fn get_mut(&mut self, fingerprint: &str) -> Option<&mut CacheEntry> {
        let seq = self.index.get(fingerprint)?;
        self.slots.get_mut(seq).map(|(_, entry)| entry)
    }

    /// Entries in insertion order
    pub fn iterate(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.slots
            .values()
            .map(|(fingerprint, entry)| (fingerprint.as_str(), entry))
    }

    pub fn remove(&mut self, fingerprint: &str) -> Option<CacheEntry> {
        let seq = self.index.remove(fingerprint)?;
        self.slots.remove(&seq).map(|(_, entry)| entry)
    }

    pub fn remove_all(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Fingerprints ordered least recently accessed first; insertion order
    /// breaks ties.
    pub fn fingerprints_by_recency(&self) -> Vec<String> {
        let mut order: Vec<(DateTime<Utc>, u64, &str)> = self
            .slots
            .iter()
            .map(|(seq, (fingerprint, entry))| {
                (entry.last_accessed_at(), *seq, fingerprint.as_str())
            })
            .collect();

        order.sort_by_key(|(accessed, seq, _)| (*accessed, *seq));

        order
            .into_iter()
            .map(|(_, _, fingerprint)| fingerprint.to_string())
            .collect()
    }

    /// Latest access time across all entries
    pub fn newest_access(&self) -> Option<DateTime<Utc>> {
        self.slots
            .values()
            .map(|(_, entry)| entry.last_accessed_at())
            .max()
    }
}

impl PartialEq for CacheStore {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iterate().eq(other.iterate())
    }
}
