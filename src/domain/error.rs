use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while writing cache state to disk
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid cache path {}: {message}", path.display())]
    InvalidPath { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl PersistenceError {
    pub fn invalid_path(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

/// Core cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl CacheError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
