//! Cross-encoder relevance scorers.
//!
//! Concrete backends for the core
//! [`RelevanceScorer`](easy_research_core::rerank::RelevanceScorer) trait:
//!
//! | Config Value | Scorer | Notes |
//! |-------------|--------|-------|
//! | `"http"` | [`HttpScorer`] | `POST {url}/rerank` sidecar, scores returned as-is |
//! | `"local"` | `LocalScorer` | fastembed cross-encoder, logits squashed with a sigmoid |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use easy_research_core::rerank::RelevanceScorer;

use crate::config::RerankerConfig;
use crate::http;

/// Scores passages through an HTTP reranking sidecar.
///
/// Request: `{"query": "...", "documents": ["..."]}`.
/// Response: `{"scores": [0.93, 0.12, ...]}`, one score per document.
pub struct HttpScorer {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

impl HttpScorer {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("reranker.url required for http provider"))?;
        Ok(Self {
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl RelevanceScorer for HttpScorer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": passages,
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/rerank", self.base_url),
            None,
            &body,
            0,
            "Reranker sidecar",
        )
        .await?;
        let parsed: RerankResponse = serde_json::from_value(json)
            .map_err(|e| anyhow!("Invalid reranker response: {}", e))?;
        Ok(parsed.scores)
    }
}

/// Local cross-encoder via fastembed. The model loads on first use.
#[cfg(feature = "local-models")]
pub struct LocalScorer {
    model_name: String,
    model: Arc<std::sync::Mutex<Option<fastembed::TextRerank>>>,
}

#[cfg(feature = "local-models")]
impl LocalScorer {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        config_to_fastembed_reranker(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-models")]
#[async_trait]
impl RelevanceScorer for LocalScorer {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let query = query.to_string();
        let documents: Vec<String> = passages.iter().map(|p| p.to_string()).collect();
        let slot = Arc::clone(&self.model);
        let name = self.model_name.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("local reranker lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextRerank::try_new(
                    fastembed::RerankInitOptions::new(config_to_fastembed_reranker(&name)?)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local reranker: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local reranker not loaded"))?;
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            let results = model
                .rerank(query.as_str(), &docs, false, None)
                .map_err(|e| anyhow!("Local reranking failed: {}", e))?;
            scores_in_input_order(
                docs.len(),
                results.iter().map(|r| (r.index, r.score)),
            )
        })
        .await?
    }
}

#[cfg(feature = "local-models")]
fn config_to_fastembed_reranker(name: &str) -> Result<fastembed::RerankerModel> {
    match name {
        "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(fastembed::RerankerModel::BGERerankerV2M3),
        other => bail!(
            "Unknown local reranker model: '{}'. Supported models: bge-reranker-base, bge-reranker-v2-m3",
            other
        ),
    }
}

/// Reorder `(index, logit)` pairs back to input order, squashing logits
/// into `[0, 1]`.
pub fn scores_in_input_order(
    len: usize,
    results: impl Iterator<Item = (usize, f32)>,
) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; len];
    for (index, logit) in results {
        match scores.get_mut(index) {
            Some(slot) => *slot = Some(easy_research_core::rerank::sigmoid(logit)),
            None => bail!("reranker returned out-of-range index {}", index),
        }
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| anyhow!("reranker returned no score for passage {}", i)))
        .collect()
}

/// Create the [`RelevanceScorer`] named by the configuration.
pub fn create_scorer(config: &RerankerConfig) -> Result<Arc<dyn RelevanceScorer>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpScorer::new(config)?)),
        #[cfg(feature = "local-models")]
        "local" => Ok(Arc::new(LocalScorer::new(config)?)),
        #[cfg(not(feature = "local-models"))]
        "local" => bail!("Local reranker requires --features local-models"),
        other => bail!("Unknown reranker provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_restored_to_input_order() {
        let scores = scores_in_input_order(3, vec![(2, 4.0), (0, 0.0), (1, -4.0)].into_iter())
            .unwrap();
        assert!((scores[0] - 0.5).abs() < 1e-6);
        assert!(scores[1] < 0.05);
        assert!(scores[2] > 0.95);
    }

    #[test]
    fn test_missing_score_is_error() {
        assert!(scores_in_input_order(2, vec![(0, 1.0)].into_iter()).is_err());
    }

    #[test]
    fn test_out_of_range_index_is_error() {
        assert!(scores_in_input_order(1, vec![(3, 1.0)].into_iter()).is_err());
    }

    #[test]
    fn test_http_scorer_requires_url() {
        let config = RerankerConfig {
            provider: "http".into(),
            ..Default::default()
        };
        assert!(create_scorer(&config).is_err());
    }

    #[tokio::test]
    async fn test_http_scorer_empty_passages_skip_request() {
        let config = RerankerConfig {
            provider: "http".into(),
            url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        let scorer = HttpScorer::new(&config).unwrap();
        assert!(scorer.score("q", &[]).await.unwrap().is_empty());
    }
}
