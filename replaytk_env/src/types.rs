//! Common types for the replaytk environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier of a simulated entity.
///
/// Ids come straight from the recorded logs and the scenario manifest, so
/// they are free-form strings. The empty string never names an entity; log
/// records use it (or `-`) to mean "relative to world space".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses a parent reference token from a log record.
    ///
    /// Returns `None` for world-space markers (empty, `-`, `none`, `null`).
    pub fn parent_ref(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.to_ascii_lowercase().as_str() {
            "" | "-" | "none" | "null" | "world" => None,
            _ => Some(Self::new(token)),
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
