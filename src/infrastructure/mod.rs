//! Infrastructure layer - persistence, services and logging

pub mod logging;
pub mod semantic_cache;
pub mod services;
