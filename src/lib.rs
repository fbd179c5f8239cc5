//! # EasyResearch
//!
//! Question answering over a curated document workspace.
//!
//! Files are split into a parent/child chunk hierarchy, embedded, and
//! stored per workspace. A question is rewritten into a standalone query
//! when it leans on the conversation, recalled by vector similarity,
//! rescored with BM25 and a cross-encoder, fused, and answered by a chat
//! model from the parent passages of the best candidates.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐
//! │  Files   │──▶│ Chunk+Embed │──▶│  SQLite   │
//! │ pdf/docx │   │   (core)    │   │ vectors   │
//! └──────────┘   └─────────────┘   └─────┬─────┘
//!                                        │
//!      question ─▶ contextualize ─▶ recall ─▶ BM25 + rerank ─▶ synthesize
//! ```
//!
//! The algorithms live in `easy-research-core`; this crate provides the
//! concrete services (SQLite, HTTP and local models), the request pipeline
//! and the `er` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite `VectorStore` |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`rerank`] | Cross-encoder relevance scorers |
//! | [`generation`] | Chat generation clients |
//! | [`http`] | JSON POST with retry |
//! | [`pipeline`] | Request pipeline with per-stage timeouts |
//! | [`workspace`] | Workspace administration |
//! | [`commands`] | CLI command handlers |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod migrate;
pub mod pipeline;
pub mod rerank;
pub mod sqlite_store;
pub mod workspace;
