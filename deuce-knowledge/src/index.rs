//! Nearest-neighbour index over embedded document chunks.
//!
//! Every build produces a new immutable [`IndexSnapshot`]. Readers clone the
//! current `Arc` and search it without holding any lock, so a rebuild never
//! blocks a search and a search never sees chunks from two generations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::KnowledgeSettings;
use crate::chunker::chunk_markdown;
use crate::embeddings::{Embedder, l2_normalize};
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{DocumentChunk, RetrievalResult, ScoredChunk, SourceDocument};
use crate::storage::source_fingerprint;

/// What a generation was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOrigin {
    /// [`Embedder::fingerprint`] of the embedder that produced the vectors
    pub embedder: String,
    /// [`source_fingerprint`] of the documents
    pub sources: String,
}

/// One fully built generation of the index.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub generation: u64,
    /// Embedding dimensionality; `0` for an empty snapshot.
    pub dim: usize,
    pub chunks: Vec<Arc<DocumentChunk>>,
    pub built_at: DateTime<Utc>,
    pub origin: SnapshotOrigin,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            dim: 0,
            chunks: Vec::new(),
            built_at: Utc::now(),
            origin: SnapshotOrigin::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Cosine top-`k` over this generation.
    ///
    /// Ordered by descending score, ties broken by chunk id ascending. An
    /// empty snapshot, `k == 0` or a query of the wrong dimension yields an
    /// empty result.
    pub fn search(&self, query: &[f32], k: usize, min_score: Option<f32>) -> RetrievalResult {
        if self.chunks.is_empty() || k == 0 {
            return RetrievalResult::empty(self.generation);
        }
        if query.len() != self.dim {
            warn!(
                expected = self.dim,
                actual = query.len(),
                "query embedding dimension mismatch"
            );
            return RetrievalResult::empty(self.generation);
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut hits: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = cosine(&query, &chunk.embedding)?;
                if min_score.is_some_and(|min| score < min) {
                    return None;
                }
                Some(ScoredChunk {
                    chunk: Arc::clone(chunk),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);

        RetrievalResult {
            generation: self.generation,
            hits,
        }
    }
}

/// Dot product of two unit vectors, clamped to `[-1, 1]`.
fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot.is_finite().then(|| dot.clamp(-1.0, 1.0))
}

/// Summary of a successful build.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BuildReport {
    pub generation: u64,
    pub documents: usize,
    pub chunks: usize,
    pub dim: usize,
    pub elapsed_ms: u64,
}

pub struct KnowledgeIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    embedder: Arc<dyn Embedder>,
    build_lock: tokio::sync::Mutex<()>,
    next_generation: AtomicU64,
    chunk_min_chars: usize,
    min_score: Option<f32>,
}

impl KnowledgeIndex {
    pub fn new(embedder: Arc<dyn Embedder>, settings: &KnowledgeSettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::empty())),
            embedder,
            build_lock: tokio::sync::Mutex::new(()),
            next_generation: AtomicU64::new(1),
            chunk_min_chars: settings.chunk_min_chars,
            min_score: settings.min_score,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// The generation currently serving reads.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read().expect("KnowledgeIndex lock poisoned"))
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Build a new generation from `documents` and swap it in.
    ///
    /// Builds are serialised. On any failure the previous generation keeps
    /// serving and `KnowledgeError::IndexBuild` names the offending document.
    pub async fn build(&self, documents: Vec<SourceDocument>) -> KnowledgeResult<BuildReport> {
        let (report, _) = self.build_snapshot(documents).await?;
        Ok(report)
    }

    /// Like [`build`](Self::build), also returning the generation this build
    /// published. It may already have been replaced by a later build.
    pub async fn build_snapshot(
        &self,
        documents: Vec<SourceDocument>,
    ) -> KnowledgeResult<(BuildReport, Arc<IndexSnapshot>)> {
        let _guard = self.build_lock.lock().await;
        let started = Instant::now();

        let mut seen = HashSet::new();
        for doc in &documents {
            if !seen.insert(doc.id.as_str()) {
                return Err(KnowledgeError::IndexBuild {
                    document_id: doc.id.clone(),
                    reason: "duplicate document id".to_string(),
                });
            }
        }

        let mut chunks = Vec::new();
        let mut dim: Option<usize> = None;
        for doc in &documents {
            let doc_chunks = self.embed_document(doc, &mut dim).await.map_err(|err| {
                warn!(document = %doc.id, error = %err, "document failed to embed");
                match err {
                    KnowledgeError::IndexBuild { .. } => err,
                    other => KnowledgeError::IndexBuild {
                        document_id: doc.id.clone(),
                        reason: other.to_string(),
                    },
                }
            })?;
            chunks.extend(doc_chunks.into_iter().map(Arc::new));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let snapshot = IndexSnapshot {
            generation,
            dim: dim.unwrap_or(0),
            chunks,
            built_at: Utc::now(),
            origin: SnapshotOrigin {
                embedder: self.embedder.fingerprint(),
                sources: source_fingerprint(&documents),
            },
        };
        let report = BuildReport {
            generation,
            documents: documents.len(),
            chunks: snapshot.chunks.len(),
            dim: snapshot.dim,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        let published = self.publish(snapshot);
        info!(
            generation = report.generation,
            documents = report.documents,
            chunks = report.chunks,
            "knowledge index built"
        );
        Ok((report, published))
    }

    /// Install a previously persisted snapshot as a new generation.
    pub async fn install(
        &self,
        chunks: Vec<DocumentChunk>,
        dim: usize,
        built_at: DateTime<Utc>,
        origin: SnapshotOrigin,
    ) {
        let _guard = self.build_lock.lock().await;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let count = chunks.len();
        self.publish(IndexSnapshot {
            generation,
            dim,
            chunks: chunks.into_iter().map(Arc::new).collect(),
            built_at,
            origin,
        });
        info!(generation, chunks = count, "knowledge index restored");
    }

    /// Search the current generation with a precomputed query embedding.
    pub fn search(&self, query: &[f32], k: usize) -> RetrievalResult {
        self.snapshot().search(query, k, self.min_score)
    }

    /// Embed `text` and search the current generation.
    ///
    /// An empty index short-circuits without calling the embedder.
    pub async fn search_text(&self, text: &str, k: usize) -> KnowledgeResult<RetrievalResult> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            debug!("knowledge index empty, skipping query embedding");
            return Ok(RetrievalResult::empty(snapshot.generation));
        }
        let query = self.embedder.embed_one(text).await?;
        Ok(snapshot.search(&query, k, self.min_score))
    }

    fn publish(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write().expect("KnowledgeIndex lock poisoned");
        *current = Arc::clone(&snapshot);
        snapshot
    }

    async fn embed_document(
        &self,
        doc: &SourceDocument,
        dim: &mut Option<usize>,
    ) -> KnowledgeResult<Vec<DocumentChunk>> {
        let sections = chunk_markdown(&doc.text, self.chunk_min_chars);
        if sections.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<String> = sections
            .iter()
            .map(|section| match &section.title {
                Some(title) => format!("{title}\n\n{}", section.content),
                None => section.content.clone(),
            })
            .collect();
        let vectors = self.embedder.embed_batch(&inputs).await?;
        if vectors.len() != sections.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} vectors, got {}",
                sections.len(),
                vectors.len()
            )));
        }

        let mut out = Vec::with_capacity(sections.len());
        for (section, mut embedding) in sections.into_iter().zip(vectors) {
            let expected = *dim.get_or_insert(embedding.len());
            if embedding.len() != expected || expected == 0 {
                return Err(KnowledgeError::EmbeddingDimMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            l2_normalize(&mut embedding);
            out.push(DocumentChunk {
                id: format!("{}#{}", doc.id, section.index),
                document_id: doc.id.clone(),
                text: section.content,
                section: section.title,
                category: doc.metadata.category.clone(),
                embedding,
            });
        }
        Ok(out)
    }
}
