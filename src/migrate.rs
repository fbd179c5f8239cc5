//! Database schema creation.
//!
//! All statements are idempotent (`IF NOT EXISTS`), so migrations run on
//! every `er init` and before every command that opens the store.
//!
//! # Schema
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `collections` | One row per workspace |
//! | `chunks` | Child chunks with parent text and embedding BLOB |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Open the configured database, apply the schema, and close it.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create tables and indexes on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            source TEXT NOT NULL,
            parent_index INTEGER NOT NULL,
            child_index INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            parent_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            parent_content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(collection, source)")
        .execute(pool)
        .await?;

    Ok(())
}
