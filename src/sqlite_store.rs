//! SQLite-backed [`VectorStore`] implementation.
//!
//! Every workspace is a row in `collections`; its child chunks, parent text,
//! and embeddings live in `chunks`, keyed by `(collection, id)`. Vectors are
//! stored as little-endian `f32` BLOBs and searched by brute-force cosine
//! similarity over the collection.
//!
//! Each mutating method runs in a single transaction, so a concurrent
//! question never sees a half-written batch or a partially deleted source.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use easy_research_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use easy_research_core::models::ChildChunk;
use easy_research_core::store::{IndexedChunk, SearchHit, StoredEntry, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, collection: &str, records: &[IndexedChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        for record in records {
            let chunk = &record.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (collection, id, source, parent_index, child_index,
                                    chunk_index, parent_offset, text, parent_content,
                                    embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    source = excluded.source,
                    parent_index = excluded.parent_index,
                    child_index = excluded.child_index,
                    chunk_index = excluded.chunk_index,
                    parent_offset = excluded.parent_offset,
                    text = excluded.text,
                    parent_content = excluded.parent_content,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(collection)
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.parent_index as i64)
            .bind(chunk.child_index as i64)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.parent_offset as i64)
            .bind(&chunk.text)
            .bind(&chunk.parent_content)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, parent_index, child_index, chunk_index, parent_offset,
                   text, parent_content, embedding
            FROM chunks
            WHERE collection = ?
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
                SearchHit {
                    chunk: ChildChunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        text: row.get("text"),
                        parent_index: row.get::<i64, _>("parent_index") as usize,
                        child_index: row.get::<i64, _>("child_index") as usize,
                        chunk_index: row.get::<i64, _>("chunk_index") as usize,
                        parent_content: row.get("parent_content"),
                        parent_offset: row.get::<i64, _>("parent_offset") as usize,
                    },
                    similarity,
                }
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
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in ids {
            removed += sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let chunks = sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let existed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(existed > 0 || chunks > 0)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM collections ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    async fn list_entries(&self, collection: &str) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, chunk_index, text
            FROM chunks
            WHERE collection = ?
            ORDER BY source ASC, chunk_index ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| StoredEntry {
                id: r.get("id"),
                source: r.get("source"),
                chunk_index: r.get::<i64, _>("chunk_index") as usize,
                text: r.get("text"),
            })
            .collect())
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE collection = ? AND source = ?")
            .bind(collection)
            .bind(source)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed as usize)
    }
}
