//! Training chunk types produced from a model answer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which search index an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Question/answer pair extracted by the model.
    Qa,
    /// Plain text segment of the source.
    Chunk,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Qa => "qa",
            IndexKind::Chunk => "chunk",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search-index entry of a training chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkIndex {
    /// Whether this is the entry derived from the chunk itself.
    pub default_index: bool,
    #[serde(rename = "type")]
    pub kind: IndexKind,
    pub text: String,
}

impl ChunkIndex {
    /// Creates the default index entry of the given kind.
    pub fn default_of(kind: IndexKind, text: impl Into<String>) -> Self {
        Self {
            default_index: true,
            kind,
            text: text.into(),
        }
    }
}

/// One persisted training unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingChunk {
    pub q: String,
    #[serde(default)]
    pub a: String,
    #[serde(default)]
    pub indexes: Vec<ChunkIndex>,
}

impl TrainingChunk {
    /// Kind of the default index entry, if any.
    pub fn kind(&self) -> Option<IndexKind> {
        self.indexes
            .iter()
            .find(|i| i.default_index)
            .map(|i| i.kind)
    }
}
