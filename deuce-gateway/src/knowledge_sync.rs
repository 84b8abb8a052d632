//! Keeps the knowledge index in step with the documents on disk.

use std::time::Instant;

use deuce_core::KnowledgeSettings;
use deuce_knowledge::{
    BuildReport, KnowledgeIndex, KnowledgeResult, SourceDocument, load_documents, restore_index,
    save_snapshot, source_fingerprint,
};
use tracing::{info, warn};

/// Rebuild the index from the documents directory and persist a snapshot.
///
/// Reads keep hitting the previous generation until the new one is swapped
/// in. A failed snapshot write does not fail the rebuild.
pub async fn rebuild(
    index: &KnowledgeIndex,
    settings: &KnowledgeSettings,
) -> KnowledgeResult<BuildReport> {
    let documents = load_configured(settings).await?;
    build_and_persist(index, settings, documents).await
}

/// Serve from the persisted snapshot when it matches the configured embedder
/// and the documents on disk, otherwise build.
///
/// With no documents on disk the snapshot is served as is. Failures are
/// logged; the index keeps answering with whatever it holds.
pub async fn warm_start(index: &KnowledgeIndex, settings: &KnowledgeSettings) {
    let started = Instant::now();
    let documents = match load_configured(settings).await {
        Ok(documents) => documents,
        Err(err) => {
            warn!(error = %err, "failed to read knowledge documents");
            Vec::new()
        }
    };
    let sources = (!documents.is_empty()).then(|| source_fingerprint(&documents));

    if let Some(path) = settings.resolved_snapshot_path()
        && restore_index(index, &path, sources.as_deref()).await
    {
        info!(
            generation = index.generation(),
            chunks = index.snapshot().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "knowledge index restored from snapshot"
        );
        return;
    }

    if let Err(err) = build_and_persist(index, settings, documents).await {
        warn!(error = %err, "initial knowledge build failed, retrieval stays empty");
    }
}

async fn load_configured(settings: &KnowledgeSettings) -> KnowledgeResult<Vec<SourceDocument>> {
    match settings.resolved_documents_dir() {
        Some(dir) => load_documents(&dir).await,
        None => {
            warn!("no documents directory configured, building an empty index");
            Ok(Vec::new())
        }
    }
}

/// Persists the generation this build published, even if another rebuild
/// has swapped in a newer one since.
async fn build_and_persist(
    index: &KnowledgeIndex,
    settings: &KnowledgeSettings,
    documents: Vec<SourceDocument>,
) -> KnowledgeResult<BuildReport> {
    let (report, snapshot) = index.build_snapshot(documents).await?;

    if let Some(path) = settings.resolved_snapshot_path()
        && let Err(err) = save_snapshot(&path, &snapshot).await
    {
        warn!(path = %path.display(), error = %err, "failed to persist index snapshot");
    }

    Ok(report)
}
