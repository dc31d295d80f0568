//! Ingestion pipeline: document → chunks → embeddings → index.
//!
//! Every chunk of a document is tagged `channel = document` with the document
//! name as `source`, embedded, and written in a single atomic batch followed
//! by a flush. Any failure is reported as [`RagError::IngestionFailed`] naming
//! the document, and leaves no chunks of it behind.
//!
//! Re-ingesting a document adds a second full set of chunks; there is no
//! deduplication.

use std::path::Path;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::extract::{extract_text, DocumentKind};
use crate::index::VectorIndex;
use crate::models::ChunkMetadata;

/// Ingest already-extracted text. Returns the number of chunks created.
pub async fn ingest_text(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    name: &str,
    text: &str,
) -> Result<usize> {
    index_chunks(index, chunking, name, text)
        .await
        .map_err(|e| RagError::ingestion(name, e))
}

async fn index_chunks(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    name: &str,
    text: &str,
) -> Result<usize> {
    let chunks = chunk_text(text, chunking.chunk_size, chunking.chunk_overlap)?;
    if chunks.is_empty() {
        return Err(RagError::ExtractionFailed("no extractable text".into()));
    }

    let n = chunks.len();
    let items = chunks
        .into_iter()
        .map(|c| (c, ChunkMetadata::document(name)))
        .collect();
    index.add_batch(items).await?;
    index.persist().await?;

    tracing::info!(document = name, chunks = n, "document indexed");
    Ok(n)
}

/// Extract text from raw bytes of the given kind, then ingest it.
///
/// Extraction runs on the blocking pool.
pub async fn ingest_bytes(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    name: &str,
    bytes: Vec<u8>,
    kind: DocumentKind,
) -> Result<usize> {
    tracing::debug!(document = name, kind = kind.as_str(), size = bytes.len(), "extracting");

    let text = tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
        .await
        .map_err(|e| {
            RagError::ingestion(
                name,
                RagError::ExtractionFailed(format!("extraction task failed: {}", e)),
            )
        })?
        .map_err(|e| RagError::ingestion(name, e))?;

    ingest_text(index, chunking, name, &text).await
}

/// Ingest a file from disk, named by its file name.
pub async fn ingest_file(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    path: &Path,
) -> Result<usize> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let kind = DocumentKind::detect(&name, None).ok_or_else(|| {
        RagError::InvalidInput(format!(
            "unsupported document type: {} (expected .pdf, .docx, .txt or .md)",
            name
        ))
    })?;

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RagError::ingestion(
            &name,
            RagError::ExtractionFailed(format!("cannot read {}: {}", path.display(), e)),
        )
    })?;

    ingest_bytes(index, chunking, &name, bytes, kind).await
}
