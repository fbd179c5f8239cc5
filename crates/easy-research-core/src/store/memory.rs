//! In-memory [`VectorStore`] implementation for tests and embedding hosts.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Every mutating call takes the
//! write lock once, so readers never see a half-applied change. Similarity
//! search is brute-force cosine over the collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::ChildChunk;

use super::{IndexedChunk, SearchHit, StoredEntry, VectorStore};

struct StoredRecord {
    chunk: ChildChunk,
    vector: Vec<f32>,
}

type Collection = HashMap<String, StoredRecord>;

/// In-memory store keyed by collection name, then record id.
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of records in a collection (0 if absent).
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, collection: &str, records: &[IndexedChunk]) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let target = collections.entry(collection.to_string()).or_default();
        for r in records {
            target.insert(
                r.chunk.id.clone(),
                StoredRecord {
                    chunk: r.chunk.clone(),
                    vector: r.vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().map_err(poisoned)?;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<SearchHit> = records
            .values()
            .map(|r| SearchHit {
                chunk: r.chunk.clone(),
                similarity: cosine_similarity(query_vec, &r.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| records.remove(*id).is_some()).count())
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        Ok(collections.remove(collection).is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.keys().cloned().collect())
    }

    async fn list_entries(&self, collection: &str) -> Result<Vec<StoredEntry>> {
        let collections = self.collections.read().map_err(poisoned)?;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<StoredEntry> = records
            .values()
            .map(|r| StoredEntry {
                id: r.chunk.id.clone(),
                source: r.chunk.source.clone(),
                chunk_index: r.chunk.chunk_index,
                text: r.chunk.text.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(entries)
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|_, r| r.chunk.source != source);
        Ok(before - records.len())
    }
}
