//! JSON persistence for built index generations.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::embeddings::Embedder;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::index::{IndexSnapshot, KnowledgeIndex, SnapshotOrigin};
use crate::models::{DocumentChunk, SourceDocument};

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub built_at: DateTime<Utc>,
    pub dim: usize,
    pub origin: SnapshotOrigin,
    pub checksum: String,
    pub chunks: Vec<DocumentChunk>,
}

impl SnapshotFile {
    pub fn from_snapshot(snapshot: &IndexSnapshot) -> Self {
        let chunks: Vec<DocumentChunk> = snapshot.chunks.iter().map(|c| (**c).clone()).collect();
        Self {
            version: SNAPSHOT_VERSION,
            built_at: snapshot.built_at,
            dim: snapshot.dim,
            checksum: checksum(snapshot.dim, &snapshot.origin, &chunks),
            origin: snapshot.origin.clone(),
            chunks,
        }
    }

    /// Reject a snapshot built by another embedder or from other documents.
    ///
    /// `sources` is the fingerprint of the documents on disk, when known.
    pub fn check_origin(&self, embedder: &dyn Embedder, sources: Option<&str>) -> KnowledgeResult<()> {
        let expected = embedder.fingerprint();
        if self.origin.embedder != expected {
            return Err(KnowledgeError::SnapshotStale(format!(
                "built with embedder '{}', configured '{expected}'",
                self.origin.embedder
            )));
        }
        if let Some(sources) = sources
            && self.origin.sources != sources
        {
            return Err(KnowledgeError::SnapshotStale(
                "documents changed since the snapshot was built".to_string(),
            ));
        }
        Ok(())
    }
}

/// sha256 over document ids and texts, independent of their order.
pub fn source_fingerprint(documents: &[SourceDocument]) -> String {
    let mut sorted: Vec<&SourceDocument> = documents.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let mut hasher = Sha256::new();
    for doc in sorted {
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// sha256 over the dimension, the origin and every chunk id and text, in
/// order.
pub fn checksum(dim: usize, origin: &SnapshotOrigin, chunks: &[DocumentChunk]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dim.to_le_bytes());
    hasher.update(origin.embedder.as_bytes());
    hasher.update([0u8]);
    hasher.update(origin.sources.as_bytes());
    hasher.update([0u8]);
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Write `snapshot` to `path` via a temporary file and rename.
pub async fn save_snapshot(path: &Path, snapshot: &IndexSnapshot) -> KnowledgeResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = SnapshotFile::from_snapshot(snapshot);
    let body = serde_json::to_vec(&file)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    info!(path = %path.display(), chunks = file.chunks.len(), "index snapshot saved");
    Ok(())
}

/// Read and verify a snapshot. `Ok(None)` when no file exists.
pub async fn load_snapshot(path: &Path) -> KnowledgeResult<Option<SnapshotFile>> {
    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let file: SnapshotFile = serde_json::from_slice(&body)?;
    if file.version != SNAPSHOT_VERSION {
        return Err(KnowledgeError::SnapshotVersion(file.version));
    }
    if checksum(file.dim, &file.origin, &file.chunks) != file.checksum {
        return Err(KnowledgeError::SnapshotChecksum(path.to_path_buf()));
    }
    if let Some(bad) = file.chunks.iter().find(|c| c.embedding.len() != file.dim) {
        return Err(KnowledgeError::EmbeddingDimMismatch {
            expected: file.dim,
            actual: bad.embedding.len(),
        });
    }
    Ok(Some(file))
}

/// Restore the index from `path` if a valid, current snapshot exists.
///
/// `sources` is the [`source_fingerprint`] of the documents on disk; `None`
/// skips that check. Returns whether a snapshot was installed. Stale or
/// corrupt snapshots are logged and ignored so the caller can fall back to a
/// fresh build.
pub async fn restore_index(index: &KnowledgeIndex, path: &Path, sources: Option<&str>) -> bool {
    let file = match load_snapshot(path).await {
        Ok(Some(file)) => file,
        Ok(None) => return false,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unusable index snapshot");
            return false;
        }
    };
    if let Err(err) = file.check_origin(index.embedder().as_ref(), sources) {
        info!(path = %path.display(), reason = %err, "index snapshot out of date, rebuilding");
        return false;
    }
    index
        .install(file.chunks, file.dim, file.built_at, file.origin)
        .await;
    true
}
