//! Recorded log sources.
//!
//! The playback core never touches the file system. Loaders ask a
//! [`LogSource`] for the raw text of a log by name and hand that text to the
//! parser.

use crate::error::EnvError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Provides the raw text of recorded entity logs.
pub trait LogSource {
    /// Reads the whole log identified by `name`.
    fn read(&self, name: &str) -> Result<String, EnvError>;
}

/// Reads logs from files below a data root directory.
#[derive(Debug, Clone)]
pub struct FsLogSource {
    root: PathBuf,
}

impl FsLogSource {
    /// Creates a source resolving log names relative to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a log name to its on-disk path.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl LogSource for FsLogSource {
    fn read(&self, name: &str) -> Result<String, EnvError> {
        let path = self.resolve(name);
        if !path.is_file() {
            return Err(EnvError::not_found(path.display()));
        }
        std::fs::read_to_string(&path).map_err(|source| EnvError::io(path, source))
    }
}

/// In-memory log source, keyed by log name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSource {
    logs: HashMap<String, String>,
}

impl MemoryLogSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a log.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.logs.insert(name.into(), text.into());
    }

    /// Builder-style variant of [`MemoryLogSource::insert`].
    pub fn with_log(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }
}

impl LogSource for MemoryLogSource {
    fn read(&self, name: &str) -> Result<String, EnvError> {
        self.logs
            .get(name)
            .cloned()
            .ok_or_else(|| EnvError::not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_roundtrip() {
        let source = MemoryLogSource::new().with_log("truck.log", "line");
        assert_eq!(source.read("truck.log").unwrap(), "line");
        assert!(matches!(source.read("missing.log"), Err(EnvError::LogNotFound(_))));
    }

    #[test]
    fn test_fs_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("crane.log"), "a b c").unwrap();

        let source = FsLogSource::new(dir.path());
        assert_eq!(source.read("crane.log").unwrap(), "a b c");
        assert!(matches!(source.read("nope.log"), Err(EnvError::LogNotFound(_))));
    }
}
