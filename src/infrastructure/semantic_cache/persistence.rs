//! Cache file persistence
//!
//! The primary file is the magic header `SQCACHE1` followed by a bincode
//! encoded [`PersistedCache`]. Writes go to a `.tmp` sibling that is renamed
//! over the target, so a crash mid-save never leaves a torn cache file under
//! the configured name.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::CacheStore;
use crate::domain::semantic_cache::{fingerprint, CacheEntry};
use crate::domain::PersistenceError;

const MAGIC: &[u8; 8] = b"SQCACHE1";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PersistedCacheRef<'a> {
    version: u32,
    entries: Vec<&'a CacheEntry>,
}

#[derive(Deserialize)]
struct PersistedCache {
    version: u32,
    entries: Vec<CacheEntry>,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: DateTime<Utc>,
    total_entries: usize,
    entries: Vec<&'a CacheEntry>,
}

/// Result of reading a cache file
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The file was read, or did not exist yet (empty store)
    Loaded(CacheStore),
    /// The file existed but could not be used; the cache starts cold
    FallbackEmpty(String),
}

impl LoadOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackEmpty(_))
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Loaded(_) => None,
            Self::FallbackEmpty(reason) => Some(reason),
        }
    }

    pub fn into_store(self) -> CacheStore {
        match self {
            Self::Loaded(store) => store,
            Self::FallbackEmpty(_) => CacheStore::new(),
        }
    }
}

/// Reads and writes cache files
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceManager;

impl PersistenceManager {
    /// Load a store from `path`. Never fails: a missing file yields an empty
    /// store and an unusable one yields [`LoadOutcome::FallbackEmpty`].
    pub fn load(path: &Path) -> LoadOutcome {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache file at {}, starting empty", path.display());
                return LoadOutcome::Loaded(CacheStore::new());
            }
            Err(e) => return Self::fallback(path, format!("failed to read cache file: {}", e)),
        };

        match Self::decode(&bytes) {
            Ok(store) => {
                info!("Loaded {} cache entries from {}", store.len(), path.display());
                LoadOutcome::Loaded(store)
            }
            Err(reason) => Self::fallback(path, reason),
        }
    }

    /// Write the full store to `path`
    pub fn save(path: &Path, store: &CacheStore) -> Result<(), PersistenceError> {
        let payload = PersistedCacheRef {
            version: FORMAT_VERSION,
            entries: store.iterate().map(|(_, entry)| entry).collect(),
        };

        let mut bytes = MAGIC.to_vec();
        bincode::serialize_into(&mut bytes, &payload)
            .map_err(|e| PersistenceError::serialization(format!("Failed to encode cache: {}", e)))?;

        write_atomic(path, &bytes)?;

        info!(
            "Saved {} cache entries ({} bytes) to {}",
            store.len(),
            bytes.len(),
            path.display()
        );

        Ok(())
    }

    /// Write a human-readable JSON export of every entry to `path`
    pub fn export_json(path: &Path, store: &CacheStore) -> Result<(), PersistenceError> {
        let export = JsonExport {
            exported_at: Utc::now(),
            total_entries: store.len(),
            entries: store.iterate().map(|(_, entry)| entry).collect(),
        };

        let json = serde_json::to_vec_pretty(&export)
            .map_err(|e| PersistenceError::serialization(format!("Failed to encode export: {}", e)))?;

        write_atomic(path, &json)?;

        info!("Exported {} cache entries to {}", store.len(), path.display());

        Ok(())
    }

    /// Remove the cache file; a missing file is not an error
    pub fn delete(path: &Path) -> Result<(), PersistenceError> {
        if let Ok(tmp) = tmp_path(path) {
            let _ = fs::remove_file(tmp);
        }

        match fs::remove_file(path) {
            Ok(()) => {
                info!("Deleted cache file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::io(path, e)),
        }
    }

    /// Size of the file on disk, 0 when it does not exist
    pub fn file_size(path: &Path) -> u64 {
        fs::metadata(path)
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    fn decode(bytes: &[u8]) -> Result<CacheStore, String> {
        let payload = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| "missing cache file header".to_string())?;

        let persisted: PersistedCache = bincode::deserialize(payload)
            .map_err(|e| format!("malformed cache payload: {}", e))?;

        if persisted.version != FORMAT_VERSION {
            return Err(format!(
                "unsupported cache format version {}",
                persisted.version
            ));
        }

        let mut store = CacheStore::new();

        for entry in persisted.entries {
            entry.validate()?;
            store
                .insert(fingerprint(entry.query()), entry)
                .map_err(|e| e.to_string())?;
        }

        Ok(store)
    }

    fn fallback(path: &Path, reason: String) -> LoadOutcome {
        warn!(
            "Ignoring unusable cache file {}, starting with an empty cache: {}",
            path.display(),
            reason
        );
        LoadOutcome::FallbackEmpty(reason)
    }
}

fn tmp_path(path: &Path) -> Result<PathBuf, PersistenceError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| PersistenceError::invalid_path(path, "path has no file name"))?;

    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");

    Ok(path.with_file_name(tmp_name))
}

fn check_parent(path: &Path) -> Result<(), PersistenceError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    match fs::metadata(parent) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(PersistenceError::invalid_path(
                path,
                format!("{} is not a directory", parent.display()),
            ));
        }
        Err(e) => {
            return Err(PersistenceError::invalid_path(
                path,
                format!("parent directory {} is not accessible: {}", parent.display(), e),
            ));
        }
    }

    if path.is_dir() {
        return Err(PersistenceError::invalid_path(path, "path is a directory"));
    }

    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    check_parent(path)?;
    let tmp = tmp_path(path)?;

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(PersistenceError::io(path, e));
    }

    Ok(())
}
