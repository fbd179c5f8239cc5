//! Deterministic fake services shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use easy_research::pipeline::{Pipeline, PipelineSettings};
use easy_research_core::bm25::tokenize;
use easy_research_core::contextualize::PatternDetector;
use easy_research_core::embedding::EmbeddingProvider;
use easy_research_core::generation::{GenerationError, Generator, GeneratorSource, SharedGenerator};
use easy_research_core::models::{Role, Turn};
use easy_research_core::rerank::RelevanceScorer;
use easy_research_core::store::memory::InMemoryStore;
use easy_research_core::store::VectorStore;

pub const DIMS: usize = 64;

/// Bag-of-words vectors with hashed token buckets.
pub struct HashEmbedder;

fn bucket(token: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in token.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for token in tokenize(t) {
                    v[bucket(&token)] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Relevance = share of query tokens present in the passage.
pub struct OverlapScorer;

#[async_trait]
impl RelevanceScorer for OverlapScorer {
    fn model_name(&self) -> &str {
        "overlap"
    }

    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let query = tokenize(query);
        Ok(passages
            .iter()
            .map(|p| {
                let passage = tokenize(p);
                let hits = query.iter().filter(|t| passage.contains(t)).count();
                if query.is_empty() {
                    0.0
                } else {
                    hits as f32 / query.len() as f32
                }
            })
            .collect())
    }
}

pub const ANSWER: &str = "Grounded answer.";

/// Answers each kind of request from its system instruction.
///
/// Rewrites combine the previous user question with the follow-up, so a
/// follow-up after a refund question carries "refund".
#[derive(Default)]
pub struct ScriptedGenerator {
    pub systems: Mutex<Vec<String>>,
    pub fail_rewrite: bool,
    pub answer_delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn calls(&self) -> usize {
        self.systems.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, system: &str, messages: &[Turn]) -> Result<String> {
        self.systems.lock().unwrap().push(system.to_string());

        if system.contains("standalone question") {
            if self.fail_rewrite {
                bail!("rewrite backend unavailable");
            }
            let (latest, prior) = messages.split_last().expect("question turn");
            let previous = prior
                .iter()
                .rev()
                .find(|t| t.role == Role::User)
                .map(|t| t.content.trim_end_matches('?').to_string())
                .unwrap_or_default();
            return Ok(format!("\"{} ({})\"", previous, latest.content));
        }
        if system.starts_with("Write a short passage") {
            return Ok("Refunds are issued within 30 days of purchase.".to_string());
        }
        if system.contains("Summarize") {
            return Ok("Overview: refunds and shipping.".to_string());
        }
        if let Some(delay) = self.answer_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ANSWER.to_string())
    }
}

/// A source that has no credential to hand out.
pub struct NoCredential;

impl GeneratorSource for NoCredential {
    fn generator(&self, _credential: Option<&str>) -> Result<Arc<dyn Generator>, GenerationError> {
        Err(GenerationError::MissingCredential {
            provider: "groq".to_string(),
            env_var: "GROQ_API_KEY".to_string(),
        })
    }
}

pub fn pipeline_with(
    store: Arc<InMemoryStore>,
    generators: Arc<dyn GeneratorSource>,
    settings: PipelineSettings,
) -> Pipeline {
    let store: Arc<dyn VectorStore> = store;
    Pipeline::new(
        Arc::new(HashEmbedder),
        store,
        Arc::new(OverlapScorer),
        generators,
        Arc::new(PatternDetector::default()),
        settings,
    )
}

pub fn pipeline(store: Arc<InMemoryStore>, generator: Arc<ScriptedGenerator>) -> Pipeline {
    pipeline_with(
        store,
        Arc::new(SharedGenerator(generator)),
        PipelineSettings::default(),
    )
}

pub const REFUNDS: &str = "Refund policy: items can be returned within 30 days of purchase \
for a full refund. Opened software cannot be returned.";

pub const SHIPPING: &str = "Shipping takes 5 business days. International shipping takes \
14 days and customs fees are paid by buyers.";

pub fn refund_history() -> Vec<Turn> {
    vec![
        Turn::user("What is the refund policy?"),
        Turn::assistant("Items can be returned within 30 days for a full refund."),
    ]
}
