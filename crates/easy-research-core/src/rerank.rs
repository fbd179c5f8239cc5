//! Pairwise relevance scoring trait.
//!
//! A [`RelevanceScorer`] is a cross-encoder: it reads the query and each
//! passage together and returns one relevance score per passage. Scores are
//! expected in `[0, 1]`; implementations that produce logits should squash
//! them before returning.
//!
//! Implementations (HTTP sidecar, local fastembed model) live in the app.

use anyhow::{bail, Result};
use async_trait::async_trait;

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn model_name(&self) -> &str;

    /// Score every passage against `query`. One score per passage, in order.
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Run one batched scoring call and check the result length.
pub async fn score_passages(
    scorer: &dyn RelevanceScorer,
    query: &str,
    passages: &[&str],
) -> Result<Vec<f32>> {
    if passages.is_empty() {
        return Ok(Vec::new());
    }
    let scores = scorer.score(query, passages).await?;
    if scores.len() != passages.len() {
        bail!(
            "reranker {} returned {} scores for {} passages",
            scorer.model_name(),
            scores.len(),
            passages.len()
        );
    }
    Ok(scores)
}

/// Logistic squash for raw cross-encoder logits.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
