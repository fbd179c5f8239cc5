//! Document indexing: chunk, embed in batches, upsert, clean stale ids.
//!
//! Batches are embedded and written one after another so peak memory is
//! bounded by one batch of vectors. Each batch's ids are disjoint, so a
//! failed batch leaves earlier batches intact.
//!
//! After a successful upsert, records of the same source whose ids are not
//! part of the new chunking are removed. Re-ingesting a file therefore
//! overwrites it, and a file that shrank leaves nothing behind.

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::chunk::{chunk_document, SplitPolicy};
use crate::embedding::EmbeddingProvider;
use crate::models::{ChildChunk, SourceDocument};
use crate::store::{IndexedChunk, VectorStore, DELETE_BATCH};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Counters for one indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub chunks: usize,
    pub batches: usize,
    /// Records of an earlier version of the file that were removed.
    pub stale_removed: usize,
}

/// Embed and upsert `chunks` in batches of `batch_size`. Returns the
/// number of batches written.
pub async fn index_chunks(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    collection: &str,
    chunks: &[ChildChunk],
    batch_size: usize,
) -> Result<usize> {
    if batch_size == 0 {
        bail!("batch_size must be >= 1");
    }
    let mut batches = 0;
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_texts(&texts).await?;
        if vectors.len() != batch.len() {
            bail!(
                "embedding provider {} returned {} vectors for {} texts",
                embedder.model_name(),
                vectors.len(),
                batch.len()
            );
        }
        let records: Vec<IndexedChunk> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();
        store.upsert(collection, &records).await?;
        batches += 1;
        debug!(collection, batch = batches, size = records.len(), "batch indexed");
    }
    Ok(batches)
}

/// Chunk `doc` with its kind's policy and index it into `collection`.
///
/// A document that yields no chunks is left untouched in the store and
/// reported with `chunks == 0`.
pub async fn ingest_document(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    collection: &str,
    doc: &SourceDocument,
    batch_size: usize,
) -> Result<IngestStats> {
    let policy = SplitPolicy::for_kind(doc.kind);
    let chunks = chunk_document(doc, &policy);
    if chunks.is_empty() {
        return Ok(IngestStats::default());
    }

    let batches = index_chunks(embedder, store, collection, &chunks, batch_size).await?;
    let stale_removed = remove_stale(store, collection, &doc.filename, &chunks).await?;

    info!(
        collection,
        file = %doc.filename,
        kind = doc.kind.as_str(),
        chunks = chunks.len(),
        batches,
        stale_removed,
        "document ingested"
    );

    Ok(IngestStats {
        chunks: chunks.len(),
        batches,
        stale_removed,
    })
}

async fn remove_stale(
    store: &dyn VectorStore,
    collection: &str,
    source: &str,
    current: &[ChildChunk],
) -> Result<usize> {
    let keep: HashSet<&str> = current.iter().map(|c| c.id.as_str()).collect();
    let stale: Vec<String> = store
        .list_entries(collection)
        .await?
        .into_iter()
        .filter(|e| e.source == source && !keep.contains(e.id.as_str()))
        .map(|e| e.id)
        .collect();
    let mut removed = 0;
    for batch in stale.chunks(DELETE_BATCH) {
        removed += store.delete_by_ids(collection, batch).await?;
    }
    Ok(removed)
}
