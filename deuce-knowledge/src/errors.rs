use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },
    #[error("index build failed at document '{document_id}': {reason}")]
    IndexBuild { document_id: String, reason: String },
    #[error("snapshot checksum mismatch in {0}")]
    SnapshotChecksum(PathBuf),
    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),
    #[error("stale snapshot: {0}")]
    SnapshotStale(String),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
