//! Hybrid retrieval: vector recall, BM25, cross-encoder fusion, selection.
//!
//! The retriever works entirely through the service traits, with no
//! database or configuration dependencies. The caller supplies the
//! embedding provider, vector store, and relevance scorer.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Recall `k_target × overfetch_factor` passages by cosine similarity.
//! 2. Score every passage with BM25 against the standalone question, using
//!    the recalled set as the corpus; normalize by the batch maximum.
//! 3. Score every (question, passage) pair with the cross-encoder in one
//!    batched call.
//! 4. Fuse: `hybrid = relevance_weight × relevance + lexical_weight × lexical`.
//! 5. Keep `hybrid ≥ min_hybrid_score`; if nothing survives, keep everything.
//! 6. Stable sort by hybrid score, descending. Ties keep recall order.
//! 7. Truncate to `k_target`.
//!
//! ```text
//! question ──embed──▶ store.similarity_search ──▶ hits (recall order)
//!                                                  │
//!                       ┌──────────── BM25 ◀───────┤
//!                       │     cross-encoder ◀──────┘
//!                       ▼
//!                  fuse ─▶ filter/fallback ─▶ sort ─▶ top k
//! ```

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::bm25;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::generation::Generator;
use crate::models::{Candidate, RetrievalMethod, Scores, Turn};
use crate::rerank::{score_passages, RelevanceScorer};
use crate::store::{SearchHit, VectorStore};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Number of candidates handed to the synthesizer.
    pub k_target: usize,
    /// Recall multiplier applied to `k_target`.
    pub overfetch_factor: usize,
    pub relevance_weight: f64,
    pub lexical_weight: f64,
    /// Candidates below this hybrid score are dropped unless all are.
    pub min_hybrid_score: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k_target: 10,
            overfetch_factor: 2,
            relevance_weight: 0.7,
            lexical_weight: 0.3,
            min_hybrid_score: 0.1,
        }
    }
}

impl RetrievalParams {
    pub fn recall_size(&self) -> usize {
        self.k_target.saturating_mul(self.overfetch_factor.max(1))
    }
}

/// How the recall query text is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalStrategy {
    /// Embed the standalone question.
    #[default]
    Standard,
    /// Embed a generated hypothetical answer passage.
    HypotheticalDocument,
}

impl RetrievalStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalStrategy::Standard => "standard",
            RetrievalStrategy::HypotheticalDocument => "hypothetical",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(RetrievalStrategy::Standard),
            "hypothetical" => Ok(RetrievalStrategy::HypotheticalDocument),
            other => bail!("Unknown retrieval strategy: {other}. Use standard or hypothetical."),
        }
    }
}

/// The text embedded for recall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recall {
    /// Recall with the standalone question itself.
    Question,
    /// Recall with a hypothetical answer passage.
    Hypothetical(String),
}

impl Recall {
    fn method(&self) -> RetrievalMethod {
        match self {
            Recall::Question => RetrievalMethod::Vector,
            Recall::Hypothetical(_) => RetrievalMethod::Hypothetical,
        }
    }

    fn text<'a>(&'a self, question: &'a str) -> &'a str {
        match self {
            Recall::Question => question,
            Recall::Hypothetical(passage) => passage,
        }
    }
}

/// Service handles used by [`retrieve`].
#[derive(Clone, Copy)]
pub struct RetrievalServices<'a> {
    pub embedder: &'a dyn EmbeddingProvider,
    pub store: &'a dyn VectorStore,
    pub scorer: &'a dyn RelevanceScorer,
}

/// Result of one retrieval.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Selected candidates, best first.
    pub candidates: Vec<Candidate>,
    /// Number of passages returned by recall.
    pub initial_count: usize,
    /// External-call failures that emptied the result.
    pub warnings: Vec<String>,
}

impl Retrieval {
    fn failed(initial_count: usize, warning: String) -> Self {
        Self {
            candidates: Vec::new(),
            initial_count,
            warnings: vec![warning],
        }
    }
}

/// Weighted fusion of relevance and normalized lexical score.
///
/// Monotonically non-decreasing in both inputs for non-negative weights.
pub fn hybrid_score(relevance: f64, lexical: f64, params: &RetrievalParams) -> f64 {
    params.relevance_weight * relevance + params.lexical_weight * lexical
}

fn finite_or_zero(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Attach scores to recalled hits. Inputs are parallel, in recall order.
///
/// Non-finite inputs are scored as 0.0.
pub fn fuse(
    hits: Vec<SearchHit>,
    lexical: &[f64],
    relevance: &[f32],
    method: RetrievalMethod,
    params: &RetrievalParams,
) -> Vec<Candidate> {
    hits.into_iter()
        .zip(lexical.iter().zip(relevance.iter()))
        .enumerate()
        .map(|(rank, (hit, (&lex, &rel)))| {
            let rel = finite_or_zero(rel as f64);
            let lex = finite_or_zero(lex);
            Candidate {
                scores: Scores {
                    similarity: hit.similarity,
                    lexical: lex,
                    relevance: rel,
                    hybrid: finite_or_zero(hybrid_score(rel, lex, params)),
                },
                chunk: hit.chunk,
                method,
                recall_rank: rank,
            }
        })
        .collect()
}

/// Threshold, sort, and truncate fused candidates.
///
/// If the threshold removes every candidate, the unfiltered set is used
/// instead, so a non-empty input always yields a non-empty output.
pub fn select(candidates: Vec<Candidate>, params: &RetrievalParams) -> Vec<Candidate> {
    let total = candidates.len();
    let (kept, dropped): (Vec<Candidate>, Vec<Candidate>) = candidates
        .into_iter()
        .partition(|c| c.scores.hybrid >= params.min_hybrid_score);

    let mut selected = if kept.is_empty() {
        debug!(total, "no candidate passed the hybrid threshold, using all");
        dropped
    } else {
        kept
    };

    selected.sort_by(|a, b| b.scores.hybrid.total_cmp(&a.scores.hybrid));
    selected.truncate(params.k_target);
    selected
}

/// Run hybrid retrieval for `question` against `collection`.
///
/// Never fails: store, embedding, or scoring errors yield an empty result
/// with a warning. An empty or absent collection yields an empty result
/// without a warning.
pub async fn retrieve(
    services: RetrievalServices<'_>,
    collection: &str,
    question: &str,
    recall: &Recall,
    params: &RetrievalParams,
) -> Retrieval {
    let recall_text = recall.text(question);
    let hits = match recall_hits(services, collection, recall_text, params.recall_size()).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, collection, "recall failed");
            return Retrieval::failed(0, format!("recall failed: {e}"));
        }
    };

    let initial_count = hits.len();
    if hits.is_empty() {
        debug!(collection, "recall returned no passages");
        return Retrieval::default();
    }

    let passages: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
    let lexical = bm25::normalized_scores(question, &passages);
    let relevance = match score_passages(services.scorer, question, &passages).await {
        Ok(scores) => scores,
        Err(e) => {
            warn!(error = %e, collection, "relevance scoring failed");
            return Retrieval::failed(initial_count, format!("relevance scoring failed: {e}"));
        }
    };

    let candidates = select(
        fuse(hits, &lexical, &relevance, recall.method(), params),
        params,
    );
    debug!(
        collection,
        recalled = initial_count,
        selected = candidates.len(),
        "retrieval complete"
    );

    Retrieval {
        candidates,
        initial_count,
        warnings: Vec::new(),
    }
}

async fn recall_hits(
    services: RetrievalServices<'_>,
    collection: &str,
    text: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    let query_vec = embed_query(services.embedder, text).await?;
    services.store.similarity_search(collection, &query_vec, k).await
}

const HYPOTHETICAL_INSTRUCTION: &str = "Write a short passage (3-5 sentences) that would plausibly \
appear in a document answering the question below. Write it in the language of the question. \
Return only the passage.";

/// Generate a hypothetical answer passage to use as recall text.
pub async fn hypothetical_passage(generator: &dyn Generator, question: &str) -> Result<String> {
    let passage = generator
        .generate(HYPOTHETICAL_INSTRUCTION, &[Turn::user(question)])
        .await?;
    let passage = passage.trim();
    if passage.is_empty() {
        bail!("hypothetical passage generation returned no text");
    }
    Ok(passage.to_string())
}
