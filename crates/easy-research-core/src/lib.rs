//! # EasyResearch Core
//!
//! Retrieval-and-ranking logic for EasyResearch: data models, hierarchical
//! chunking, BM25, conversational query rewriting, hybrid retrieval with
//! cross-encoder fusion, answer synthesis, and the service traits they
//! run against.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. External
//! services are reached only through traits:
//!
//! | Trait | Module |
//! |-------|--------|
//! | [`EmbeddingProvider`](embedding::EmbeddingProvider) | [`embedding`] |
//! | [`VectorStore`](store::VectorStore) | [`store`] |
//! | [`RelevanceScorer`](rerank::RelevanceScorer) | [`rerank`] |
//! | [`Generator`](generation::Generator) | [`generation`] |
//! | [`ReferenceDetector`](contextualize::ReferenceDetector) | [`contextualize`] |

pub mod bm25;
pub mod chunk;
pub mod contextualize;
pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod rerank;
pub mod retrieve;
pub mod store;
pub mod summarize;
pub mod synthesize;
