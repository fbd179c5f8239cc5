//! Configuration parsing and validation.
//!
//! EasyResearch is configured via a TOML file (default: `config/er.toml`).
//! Every section except `[db]` is optional and falls back to defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [db]
//! path = "./data/easyresearch.sqlite"
//!
//! [ingest]
//! batch_size = 500
//!
//! [retrieval]
//! k_target = 10
//! overfetch_factor = 2
//! relevance_weight = 0.7
//! lexical_weight = 0.3
//! min_hybrid_score = 0.1
//! strategy = "standard"
//! stage_timeout_secs = 60
//!
//! [embedding]
//! provider = "local"
//! model = "paraphrase-multilingual-minilm-l12-v2"
//!
//! [reranker]
//! provider = "local"
//! model = "bge-reranker-base"
//!
//! [generation]
//! provider = "groq"
//! model = "llama-3.3-70b-versatile"
//! api_key_env = "GROQ_API_KEY"
//! ```
//!
//! # Validation
//!
//! [`load_config`] rejects out-of-range retrieval parameters, unknown
//! provider names, and remote providers missing the settings they need.

use anyhow::{bail, Context, Result};
use easy_research_core::retrieve::{RetrievalParams, RetrievalStrategy};
use easy_research_core::synthesize::SynthesisParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub contextualize: ContextualizeConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Chunks embedded and written per store call.
    #[serde(default = "default_ingest_batch")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch(),
        }
    }
}

fn default_ingest_batch() -> usize {
    easy_research_core::ingest::DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k_target")]
    pub k_target: usize,
    #[serde(default = "default_overfetch")]
    pub overfetch_factor: usize,
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_min_hybrid")]
    pub min_hybrid_score: f64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Upper bound on each external stage of a question.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_target: default_k_target(),
            overfetch_factor: default_overfetch(),
            relevance_weight: default_relevance_weight(),
            lexical_weight: default_lexical_weight(),
            min_hybrid_score: default_min_hybrid(),
            strategy: default_strategy(),
            stage_timeout_secs: default_stage_timeout(),
        }
    }
}

fn default_k_target() -> usize {
    10
}
fn default_overfetch() -> usize {
    2
}
fn default_relevance_weight() -> f64 {
    0.7
}
fn default_lexical_weight() -> f64 {
    0.3
}
fn default_min_hybrid() -> f64 {
    0.1
}
fn default_strategy() -> String {
    "standard".to_string()
}
fn default_stage_timeout() -> u64 {
    60
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            k_target: self.k_target,
            overfetch_factor: self.overfetch_factor,
            relevance_weight: self.relevance_weight,
            lexical_weight: self.lexical_weight,
            min_hybrid_score: self.min_hybrid_score,
        }
    }

    pub fn strategy(&self) -> Result<RetrievalStrategy> {
        self.strategy.parse()
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextualizeConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for ContextualizeConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    easy_research_core::contextualize::DEFAULT_MAX_TURNS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_turn_char_cap")]
    pub turn_char_cap: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            turn_char_cap: default_turn_char_cap(),
        }
    }
}

fn default_history_turns() -> usize {
    6
}
fn default_turn_char_cap() -> usize {
    300
}

impl SynthesisConfig {
    pub fn params(&self) -> SynthesisParams {
        SynthesisParams {
            history_turns: self.history_turns,
            turn_char_cap: self.turn_char_cap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    /// Base URL of the `http` scoring sidecar.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_reranker_timeout")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model: default_reranker_model(),
            url: None,
            timeout_secs: default_reranker_timeout(),
        }
    }
}

fn default_reranker_provider() -> String {
    "local".to_string()
}
fn default_reranker_model() -> String {
    "bge-reranker-base".to_string()
}
fn default_reranker_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Environment variable holding the fallback API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Base URL override. Each provider has its own default.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            url: None,
            timeout_secs: default_generation_timeout(),
            max_retries: default_generation_retries(),
        }
    }
}

fn default_generation_provider() -> String {
    "groq".to_string()
}
fn default_generation_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_generation_retries() -> u32 {
    3
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be >= 1");
    }

    let r = &config.retrieval;
    if r.k_target < 1 {
        bail!("retrieval.k_target must be >= 1");
    }
    if r.overfetch_factor < 1 {
        bail!("retrieval.overfetch_factor must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.relevance_weight) {
        bail!("retrieval.relevance_weight must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&r.lexical_weight) {
        bail!("retrieval.lexical_weight must be in [0.0, 1.0]");
    }
    r.strategy()?;
    if r.stage_timeout_secs == 0 {
        bail!("retrieval.stage_timeout_secs must be > 0");
    }

    let e = &config.embedding;
    match e.provider.as_str() {
        "local" => {}
        "openai" | "ollama" => {
            if e.dims.is_none() || e.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
            }
            if e.model.is_none() {
                bail!("embedding.model must be specified when provider is '{}'", e.provider);
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
            other
        ),
    }
    if e.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.reranker.provider.as_str() {
        "local" => {}
        "http" => {
            if config.reranker.url.is_none() {
                bail!("reranker.url must be set when provider is 'http'");
            }
        }
        other => bail!("Unknown reranker provider: '{}'. Must be local or http.", other),
    }

    match config.generation.provider.as_str() {
        "groq" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be groq, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
