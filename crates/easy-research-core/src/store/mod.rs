//! Vector store abstraction for EasyResearch.
//!
//! The [`VectorStore`] trait defines every storage operation needed by
//! ingestion, retrieval, and workspace administration. Records are grouped
//! in named collections (one per workspace); ids are unique per collection.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! each mutating call must be atomic: a concurrent reader sees either the
//! state before or after it.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::ChildChunk;

/// A child chunk with its embedding, as written to the store.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: ChildChunk,
    pub vector: Vec<f32>,
}

/// A record returned by similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChildChunk,
    /// Cosine similarity to the query vector.
    pub similarity: f64,
}

/// Record metadata without the vector, for administration scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredEntry {
    pub id: String,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

/// Per-collection counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub chunks: usize,
    pub files: usize,
    /// Approximate payload size (text plus vectors) in megabytes.
    pub size_mb: f64,
}

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite records by id |
/// | [`similarity_search`](VectorStore::similarity_search) | Top-k cosine search |
/// | [`delete_by_ids`](VectorStore::delete_by_ids) | Remove records |
/// | [`delete_collection`](VectorStore::delete_collection) | Drop a workspace |
/// | [`list_collections`](VectorStore::list_collections) | Workspace names |
/// | [`list_entries`](VectorStore::list_entries) | Metadata scan |
/// | [`delete_source`](VectorStore::delete_source) | Remove one file's records |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records. Creates the collection if needed.
    async fn upsert(&self, collection: &str, records: &[IndexedChunk]) -> Result<()>;

    /// The `k` most similar records, most similar first. An unknown
    /// collection yields an empty result.
    async fn similarity_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Remove records by id. Returns how many were removed.
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize>;

    /// Drop a collection and all of its records. Returns whether it existed.
    async fn delete_collection(&self, collection: &str) -> Result<bool>;

    /// Names of all collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Metadata of every record in a collection, ordered by source then
    /// chunk index.
    async fn list_entries(&self, collection: &str) -> Result<Vec<StoredEntry>>;

    /// Remove every record whose source is `source`.
    ///
    /// Scans entries, then deletes the matching ids in batches of
    /// [`DELETE_BATCH`]. Returns how many records were removed.
    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize> {
        let ids: Vec<String> = self
            .list_entries(collection)
            .await?
            .into_iter()
            .filter(|e| e.source == source)
            .map(|e| e.id)
            .collect();
        let mut removed = 0;
        for batch in ids.chunks(DELETE_BATCH) {
            removed += self.delete_by_ids(collection, batch).await?;
        }
        Ok(removed)
    }
}

/// Batch size for id-based deletes.
pub const DELETE_BATCH: usize = 500;

/// Counters for a collection computed from a metadata scan.
///
/// Vector bytes are estimated from `dims`.
pub async fn collection_stats(
    store: &dyn VectorStore,
    collection: &str,
    dims: usize,
) -> Result<CollectionStats> {
    let entries = store.list_entries(collection).await?;
    let mut files: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
    files.dedup();
    let bytes: usize = entries.iter().map(|e| e.text.len() + dims * 4).sum();
    Ok(CollectionStats {
        chunks: entries.len(),
        files: files.len(),
        size_mb: bytes as f64 / (1024.0 * 1024.0),
    })
}
