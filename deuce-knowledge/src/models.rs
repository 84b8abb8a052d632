use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Document handed to `KnowledgeIndex::build`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.metadata.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

/// Embedded unit of document text. Immutable once a generation is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `{document_id}#{ordinal}`
    pub id: String,
    pub document_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Unit-length embedding.
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<DocumentChunk>,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Ranked hits from one index generation, best first.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub generation: u64,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            hits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.chunk.id.clone()).collect()
    }
}
