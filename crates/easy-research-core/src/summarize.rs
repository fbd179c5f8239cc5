//! Workspace overview from its opening passages.

use tracing::warn;

use crate::generation::Generator;
use crate::models::Turn;
use crate::store::StoredEntry;

/// Number of leading chunks sampled for the overview.
pub const SUMMARY_SAMPLE: usize = 10;

const SUMMARY_INSTRUCTION: &str = "You are an expert research assistant. \
Summarize the following document snippets into a concise overview. \
Focus on: Main Topic, Key Objectives, and Target Audience. \
Answer in the language of the text (Vietnamese or English).";

/// Summarize the first [`SUMMARY_SAMPLE`] entries.
///
/// `entries` should be ordered by source then chunk index, as returned by
/// [`VectorStore::list_entries`](crate::store::VectorStore::list_entries).
/// Failures are returned as text.
pub async fn summarize_workspace(generator: &dyn Generator, entries: &[StoredEntry]) -> String {
    if entries.is_empty() {
        return "This workspace has no documents yet.".to_string();
    }
    let sample = entries
        .iter()
        .take(SUMMARY_SAMPLE)
        .map(|e| e.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let message = Turn::user(format!("Context to summarize:\n{sample}"));
    match generator.generate(SUMMARY_INSTRUCTION, &[message]).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "workspace summary failed");
            format!("Summary failed: {e}")
        }
    }
}
