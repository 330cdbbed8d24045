//! Domain layer - cache entities, configuration and errors

pub mod error;
pub mod semantic_cache;

pub use error::{CacheError, PersistenceError};
