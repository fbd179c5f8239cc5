//! Workspace administration: ingestion of files and directories, listing,
//! statistics, per-file removal, deletion, and overview summaries.
//!
//! A workspace is one vector-store collection. Names are normalized with
//! [`normalize_name`] before use.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use easy_research_core::embedding::EmbeddingProvider;
use easy_research_core::generation::GeneratorSource;
use easy_research_core::ingest::ingest_document;
use easy_research_core::store::{collection_stats, CollectionStats, VectorStore};
use easy_research_core::summarize::summarize_workspace;

use crate::extract;

/// Trim `raw` and replace spaces with underscores.
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim().replace(' ', "_");
    if name.is_empty() {
        bail!("workspace name must not be empty");
    }
    Ok(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    /// Readable but produced no chunks.
    Skipped,
    Failed,
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub chunks: usize,
    pub message: Option<String>,
}

impl FileReport {
    fn failed(path: PathBuf, message: String) -> Self {
        Self {
            path,
            status: FileStatus::Failed,
            chunks: 0,
            message: Some(message),
        }
    }
}

/// Expand `paths` into files. Directories are walked recursively; hidden
/// entries are skipped. Unreadable entries are returned as errors.
pub fn collect_files(paths: &[PathBuf]) -> Vec<Result<PathBuf, (PathBuf, String)>> {
    let mut out = Vec::new();
    for root in paths {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => out.push(Ok(entry.into_path())),
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    out.push(Err((path, e.to_string())));
                }
            }
        }
    }
    out
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Ingest every file under `paths` into `workspace`.
///
/// Files are processed one at a time; a failing file is reported and the
/// rest of the batch continues.
pub async fn ingest_paths(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    workspace: &str,
    paths: &[PathBuf],
    batch_size: usize,
) -> Vec<FileReport> {
    let mut reports = Vec::new();
    for item in collect_files(paths) {
        let path = match item {
            Ok(path) => path,
            Err((path, message)) => {
                warn!(path = %path.display(), error = %message, "cannot walk path");
                reports.push(FileReport::failed(path, message));
                continue;
            }
        };
        reports.push(ingest_file(embedder, store, workspace, path, batch_size).await);
    }
    let indexed = reports
        .iter()
        .filter(|r| r.status == FileStatus::Indexed)
        .count();
    info!(workspace, files = reports.len(), indexed, "ingestion finished");
    reports
}

async fn ingest_file(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    workspace: &str,
    path: PathBuf,
    batch_size: usize,
) -> FileReport {
    let doc = match extract::load_document(&path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "extraction failed");
            return FileReport::failed(path, e.to_string());
        }
    };
    match ingest_document(embedder, store, workspace, &doc, batch_size).await {
        Ok(stats) if stats.chunks == 0 => FileReport {
            path,
            status: FileStatus::Skipped,
            chunks: 0,
            message: Some("no text content".to_string()),
        },
        Ok(stats) => FileReport {
            path,
            status: FileStatus::Indexed,
            chunks: stats.chunks,
            message: (stats.stale_removed > 0)
                .then(|| format!("{} stale chunks removed", stats.stale_removed)),
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "indexing failed");
            FileReport::failed(path, format!("{e:#}"))
        }
    }
}

pub async fn list(store: &dyn VectorStore) -> Result<Vec<String>> {
    store.list_collections().await
}

pub async fn stats(
    store: &dyn VectorStore,
    workspace: &str,
    dims: usize,
) -> Result<CollectionStats> {
    collection_stats(store, workspace, dims).await
}

/// Per-workspace counters for every workspace in the store.
pub async fn all_stats(
    store: &dyn VectorStore,
    dims: usize,
) -> Result<Vec<(String, CollectionStats)>> {
    let mut out = Vec::new();
    for name in list(store).await? {
        let stats = collection_stats(store, &name, dims).await?;
        out.push((name, stats));
    }
    Ok(out)
}

/// Estimated size of the whole store in MB.
pub fn total_size_mb(stats: &[(String, CollectionStats)]) -> f64 {
    stats.iter().map(|(_, s)| s.size_mb).sum()
}

/// Remove one file's chunks. Returns how many were removed.
pub async fn remove_file(store: &dyn VectorStore, workspace: &str, filename: &str) -> Result<usize> {
    let removed = store.delete_source(workspace, filename).await?;
    info!(workspace, file = filename, removed, "file removed");
    Ok(removed)
}

/// Delete the workspace. Returns whether it existed.
pub async fn drop_workspace(store: &dyn VectorStore, workspace: &str) -> Result<bool> {
    let existed = store.delete_collection(workspace).await?;
    info!(workspace, existed, "workspace dropped");
    Ok(existed)
}

/// Overview of the workspace from its opening chunks.
pub async fn summarize(
    generators: &dyn GeneratorSource,
    store: &dyn VectorStore,
    workspace: &str,
    credential: Option<&str>,
) -> Result<String> {
    let generator = generators.generator(credential)?;
    let entries = store.list_entries(workspace).await?;
    Ok(summarize_workspace(generator.as_ref(), &entries).await)
}
