use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunker::parse_heading;
use crate::errors::KnowledgeResult;
use crate::models::{DocumentMetadata, SourceDocument};

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Load every markdown/text document under `root`, in path order.
///
/// The document id is the path relative to `root` with `/` separators; the
/// first directory component becomes the category tag. A missing root yields
/// no documents.
pub async fn load_documents(root: &Path) -> KnowledgeResult<Vec<SourceDocument>> {
    if !root.exists() {
        debug!(path = %root.display(), "documents directory missing");
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let id = components.join("/");
        let category = (components.len() > 1).then(|| components[0].clone());

        let text = tokio::fs::read_to_string(&path).await?;
        let title = text.lines().find_map(parse_heading);
        documents.push(SourceDocument {
            id,
            text,
            metadata: DocumentMetadata {
                category,
                title,
                source_path: Some(path),
            },
        });
    }

    debug!(count = documents.len(), "loaded knowledge documents");
    Ok(documents)
}
