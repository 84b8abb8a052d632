//! Knowledge index configuration.
//!
//! `deuce-knowledge` re-exports these types; path helpers resolve the
//! document directory and snapshot location against `DEUCE_DATA_DIR`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which backend turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Ollama `/api/embed`
    Ollama,
    /// Deterministic feature hashing, no network
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: EmbeddingProvider,
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Expected vector size. Required for `hash`, checked for `ollama`.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,
    /// Fixed number of passages returned per retrieval query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring below this are dropped before ranking.
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default = "default_chunk_min_chars")]
    pub chunk_min_chars: usize,
    #[serde(default)]
    pub documents_dir: Option<PathBuf>,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            embedding_provider: default_embedding_provider(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_dim: None,
            embedding_batch: default_embedding_batch(),
            top_k: default_top_k(),
            min_score: None,
            chunk_min_chars: default_chunk_min_chars(),
            documents_dir: None,
            snapshot_path: None,
        }
    }
}

impl KnowledgeSettings {
    /// Directory walked for source documents.
    pub fn resolved_documents_dir(&self) -> Option<PathBuf> {
        self.documents_dir
            .clone()
            .or_else(|| data_root().map(|root| root.join("knowledge")))
    }

    /// File the built index is persisted to.
    pub fn resolved_snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_path
            .clone()
            .or_else(|| data_root().map(|root| root.join("index.json")))
    }
}

/// Root data directory (`DEUCE_DATA_DIR`, else the XDG data dir).
pub fn data_root() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DEUCE_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir().map(|dir| dir.join("dr-deuce"))
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Ollama
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

fn default_top_k() -> usize {
    3
}

fn default_chunk_min_chars() -> usize {
    200
}
