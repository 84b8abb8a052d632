use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use deuce_knowledge::{HashEmbedder, KnowledgeIndex, KnowledgeSettings, SourceDocument};

fn documents(prefix: &str) -> Vec<SourceDocument> {
    (0..8)
        .map(|i| {
            SourceDocument::new(
                format!("{prefix}/doc-{i}.md"),
                format!("# Section {i}\nNotes about blood pressure and hydration, part {i}.\n"),
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn searches_never_mix_generations_during_rebuilds() {
    let settings = KnowledgeSettings {
        chunk_min_chars: 0,
        ..Default::default()
    };
    let index = Arc::new(KnowledgeIndex::new(Arc::new(HashEmbedder::new(64)), &settings));
    index.build(documents("gen-a")).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut checked = 0usize;
            loop {
                let result = index.search_text("blood pressure hydration", 5).await.unwrap();
                assert!(result.len() <= 5);
                let prefixes: Vec<&str> = result
                    .hits
                    .iter()
                    .map(|hit| hit.chunk.document_id.split('/').next().unwrap_or_default())
                    .collect();
                assert!(
                    prefixes.windows(2).all(|w| w[0] == w[1]),
                    "mixed generations: {prefixes:?}"
                );
                checked += 1;
                if done.load(Ordering::SeqCst) {
                    break checked;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for round in 0..20 {
        let prefix = if round % 2 == 0 { "gen-b" } else { "gen-a" };
        index.build(documents(prefix)).await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}
