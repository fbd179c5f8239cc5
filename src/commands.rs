//! CLI command handlers. Each opens the store, runs one operation, and
//! prints the result to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use easy_research_core::models::Turn;
use easy_research_core::retrieve::RetrievalStrategy;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::pipeline::{AskOptions, Pipeline};
use crate::sqlite_store::SqliteStore;
use crate::workspace::{self, FileStatus};

async fn open_pipeline(config: &Config) -> Result<Pipeline> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    Pipeline::from_config(config, Arc::new(SqliteStore::new(pool)))
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized at {}.", config.db.path.display());
    Ok(())
}

pub async fn run_ingest(config: &Config, workspace: &str, paths: &[PathBuf]) -> Result<()> {
    let workspace = workspace::normalize_name(workspace)?;
    let pipeline = open_pipeline(config).await?;
    let reports = workspace::ingest_paths(
        pipeline.embedder(),
        pipeline.store(),
        &workspace,
        paths,
        config.ingest.batch_size,
    )
    .await;

    let mut indexed = 0;
    let mut chunks = 0;
    for report in &reports {
        let status = match report.status {
            FileStatus::Indexed => "indexed",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        };
        match &report.message {
            Some(msg) => println!(
                "  {:<8} {} ({} chunks) {}",
                status,
                report.path.display(),
                report.chunks,
                msg
            ),
            None => println!(
                "  {:<8} {} ({} chunks)",
                status,
                report.path.display(),
                report.chunks
            ),
        }
        if report.status == FileStatus::Indexed {
            indexed += 1;
            chunks += report.chunks;
        }
    }
    println!(
        "Ingested {}/{} files into '{}' ({} chunks).",
        indexed,
        reports.len(),
        workspace,
        chunks
    );
    Ok(())
}

pub struct AskArgs<'a> {
    pub workspace: &'a str,
    pub question: &'a str,
    pub history: Option<&'a Path>,
    pub k: Option<usize>,
    pub api_key: Option<String>,
    pub strategy: Option<&'a str>,
    pub json: bool,
}

pub async fn run_ask(config: &Config, args: AskArgs<'_>) -> Result<()> {
    let workspace = workspace::normalize_name(args.workspace)?;
    let history = match args.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let strategy = args
        .strategy
        .map(str::parse::<RetrievalStrategy>)
        .transpose()?;
    let pipeline = open_pipeline(config).await?;
    let options = AskOptions {
        credential: args.api_key,
        k: args.k,
        strategy,
    };
    let response = pipeline
        .ask(&workspace, args.question, &history, &options)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &response.sources {
            println!("  - {}", source);
        }
    }
    let d = &response.diagnostics;
    println!();
    println!(
        "[{} strategy, {} retrieved, {} used{}]",
        d.strategy,
        d.retrieved,
        d.used,
        if d.contextualized {
            format!(", rewritten as \"{}\"", d.standalone_question)
        } else if d.contextualization_attempted {
            ", rewrite kept the question".to_string()
        } else {
            String::new()
        }
    );
    for warning in &d.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Read a JSON array of `{"role": "user"|"assistant", "content": "..."}`.
pub fn load_history(path: &Path) -> Result<Vec<Turn>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))
}

pub async fn run_workspaces(config: &Config) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let all = workspace::all_stats(pipeline.store(), pipeline.embedder().dims()).await?;
    if all.is_empty() {
        println!("No workspaces.");
        return Ok(());
    }
    for (name, stats) in &all {
        println!("{:<24} {:>6} files {:>8.2} MB", name, stats.files, stats.size_mb);
    }
    println!("Total: {:.2} MB", workspace::total_size_mb(&all));
    Ok(())
}

pub async fn run_stats(config: &Config, workspace: &str) -> Result<()> {
    let workspace = workspace::normalize_name(workspace)?;
    let pipeline = open_pipeline(config).await?;
    let stats = workspace::stats(pipeline.store(), &workspace, pipeline.embedder().dims()).await?;
    println!("Workspace:   {}", workspace);
    println!("  Chunks:    {}", stats.chunks);
    println!("  Files:     {}", stats.files);
    println!("  Size:      {:.2} MB", stats.size_mb);
    Ok(())
}

pub async fn run_remove(config: &Config, workspace: &str, filename: &str) -> Result<()> {
    let workspace = workspace::normalize_name(workspace)?;
    let pipeline = open_pipeline(config).await?;
    let removed = workspace::remove_file(pipeline.store(), &workspace, filename).await?;
    println!("Removed {} chunks of '{}' from '{}'.", removed, filename, workspace);
    Ok(())
}

pub async fn run_drop(config: &Config, workspace: &str) -> Result<()> {
    let workspace = workspace::normalize_name(workspace)?;
    let pipeline = open_pipeline(config).await?;
    if workspace::drop_workspace(pipeline.store(), &workspace).await? {
        println!("Workspace '{}' deleted.", workspace);
    } else {
        println!("Workspace '{}' does not exist.", workspace);
    }
    Ok(())
}

pub async fn run_summarize(config: &Config, workspace: &str, api_key: Option<&str>) -> Result<()> {
    let workspace = workspace::normalize_name(workspace)?;
    let pipeline = open_pipeline(config).await?;
    let summary =
        workspace::summarize(pipeline.generators(), pipeline.store(), &workspace, api_key).await?;
    println!("{}", summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"role": "user", "content": "What is the refund policy?"},
                {"role": "assistant", "content": "30 days."}]"#,
        )
        .unwrap();
        let turns = load_history(&path).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1], Turn::assistant("30 days."));
    }

    #[test]
    fn test_load_history_rejects_unknown_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"role": "system", "content": "x"}]"#).unwrap();
        assert!(load_history(&path).is_err());
    }
}
