//! Error types for the replaytk environment abstraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The requested log does not exist in the source
    #[error("Log not found: {0}")]
    LogNotFound(String),

    /// Reading a log from disk failed
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EnvError {
    /// Creates a not-found error.
    pub fn not_found(name: impl std::fmt::Display) -> Self {
        Self::LogNotFound(name.to_string())
    }

    /// Creates an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
