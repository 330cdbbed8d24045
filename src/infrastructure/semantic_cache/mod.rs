//! File-backed semantic cache implementation

mod engine;
mod persistence;
mod store;

pub use engine::CacheEngine;
pub use persistence::{LoadOutcome, PersistenceManager};
pub use store::CacheStore;
