//! Knowledge index for Dr. Deuce: chunked documents, embeddings and
//! nearest-neighbour lookup over immutable index generations.

pub mod chunker;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod models;
pub mod sources;
pub mod storage;

pub use deuce_core::config::{EmbeddingProvider, KnowledgeSettings};
pub use embeddings::{Embedder, EmbeddingClient, HashEmbedder, embedder_from_settings};
pub use errors::{KnowledgeError, KnowledgeResult};
pub use index::{BuildReport, IndexSnapshot, KnowledgeIndex, SnapshotOrigin};
pub use models::{DocumentChunk, DocumentMetadata, RetrievalResult, ScoredChunk, SourceDocument};
pub use sources::load_documents;
pub use storage::{load_snapshot, restore_index, save_snapshot, source_fingerprint};
