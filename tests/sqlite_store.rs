//! Integration tests for the SQLite vector store.

mod common;

use std::sync::Arc;

use common::*;
use easy_research::db;
use easy_research::migrate;
use easy_research::pipeline::AskOptions;
use easy_research::sqlite_store::SqliteStore;
use easy_research_core::embedding::EmbeddingProvider;
use easy_research_core::generation::SharedGenerator;
use easy_research_core::ingest::{ingest_document, DEFAULT_BATCH_SIZE};
use easy_research_core::models::SourceDocument;
use easy_research_core::store::{collection_stats, VectorStore};
use tempfile::TempDir;

async fn open() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let pool = db::connect_path(&dir.path().join("data/er.sqlite"))
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (dir, SqliteStore::new(pool))
}

async fn seed(store: &SqliteStore, collection: &str) {
    for (name, text) in [("refunds.txt", REFUNDS), ("shipping.txt", SHIPPING)] {
        ingest_document(
            &HashEmbedder,
            store,
            collection,
            &SourceDocument::new(name, text),
            DEFAULT_BATCH_SIZE,
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_upsert_and_search() {
    let (_dir, store) = open().await;
    seed(&store, "policies").await;

    let query = HashEmbedder
        .embed_texts(&[REFUNDS.to_string()])
        .await
        .unwrap()
        .remove(0);
    let hits = store.similarity_search("policies", &query, 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.source, "refunds.txt");
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
    assert_eq!(hits[0].chunk.parent_content, REFUNDS);
    assert!(hits[0].similarity >= hits[1].similarity);

    assert!(store
        .similarity_search("unknown", &query, 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let (_dir, store) = open().await;
    seed(&store, "policies").await;
    let first = store.list_entries("policies").await.unwrap();
    seed(&store, "policies").await;
    let second = store.list_entries("policies").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let (_dir, store) = open().await;
    seed(&store, "a").await;
    seed(&store, "b").await;
    assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);

    assert!(store.delete_collection("a").await.unwrap());
    assert!(!store.delete_collection("a").await.unwrap());
    assert_eq!(store.list_collections().await.unwrap(), vec!["b"]);
    assert!(store.list_entries("a").await.unwrap().is_empty());
    assert_eq!(store.list_entries("b").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_source_and_ids() {
    let (_dir, store) = open().await;
    seed(&store, "policies").await;

    assert_eq!(
        store.delete_source("policies", "refunds.txt").await.unwrap(),
        1
    );
    let entries = store.list_entries("policies").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, "shipping.txt");

    let removed = store
        .delete_by_ids("policies", &[entries[0].id.clone(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(store.list_entries("policies").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats() {
    let (_dir, store) = open().await;
    seed(&store, "policies").await;
    let stats = collection_stats(&store, "policies", DIMS).await.unwrap();
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.files, 2);
    assert!(stats.size_mb > 0.0);
}

#[tokio::test]
async fn test_pipeline_over_sqlite() {
    let (_dir, store) = open().await;
    seed(&store, "policies").await;
    let store: Arc<dyn VectorStore> = Arc::new(store);
    let pipeline = easy_research::pipeline::Pipeline::new(
        Arc::new(HashEmbedder),
        store.clone(),
        Arc::new(OverlapScorer),
        Arc::new(SharedGenerator(Arc::new(ScriptedGenerator::default()))),
        Arc::new(easy_research_core::contextualize::PatternDetector::default()),
        Default::default(),
    );

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;
    assert_eq!(response.answer, ANSWER);
    assert_eq!(response.sources, vec!["refunds.txt".to_string()]);

    store.delete_collection("policies").await.unwrap();
    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;
    assert!(response.is_not_found());
}
