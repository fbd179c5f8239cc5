//! The question-answering request pipeline.
//!
//! [`Pipeline`] owns the injected services and runs one request through the
//! ordered stages:
//!
//! ```text
//! credential ─▶ contextualize ─▶ [hypothetical passage] ─▶ retrieve ─▶ synthesize
//! ```
//!
//! Every external stage runs under `stage_timeout`. A timeout or failure
//! degrades the result (raw question, standard recall, empty candidates,
//! error answer) and is recorded in [`Diagnostics::warnings`]. A missing
//! credential short-circuits before any retrieval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::timeout;
use tracing::{debug, warn};

use easy_research_core::contextualize::{
    contextualize, Contextualized, PatternDetector, ReferenceDetector, DEFAULT_MAX_TURNS,
};
use easy_research_core::embedding::EmbeddingProvider;
use easy_research_core::generation::{GenerationError, Generator, GeneratorSource};
use easy_research_core::models::{Diagnostics, QueryResponse, Turn};
use easy_research_core::rerank::RelevanceScorer;
use easy_research_core::retrieve::{
    hypothetical_passage, retrieve, Recall, Retrieval, RetrievalParams, RetrievalServices,
    RetrievalStrategy,
};
use easy_research_core::store::VectorStore;
use easy_research_core::synthesize::{collect_sources, synthesize, Synthesis, SynthesisParams};

use crate::config::Config;
use crate::embedding;
use crate::generation::GeneratorFactory;
use crate::rerank;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retrieval: RetrievalParams,
    pub strategy: RetrievalStrategy,
    pub max_turns: usize,
    pub synthesis: SynthesisParams,
    pub stage_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalParams::default(),
            strategy: RetrievalStrategy::Standard,
            max_turns: DEFAULT_MAX_TURNS,
            synthesis: SynthesisParams::default(),
            stage_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            retrieval: config.retrieval.params(),
            strategy: config.retrieval.strategy()?,
            max_turns: config.contextualize.max_turns,
            synthesis: config.synthesis.params(),
            stage_timeout: config.retrieval.stage_timeout(),
        })
    }
}

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// API key for this request; overrides the configured environment variable.
    pub credential: Option<String>,
    /// Overrides `k_target`.
    pub k: Option<usize>,
    pub strategy: Option<RetrievalStrategy>,
}

pub struct Pipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    scorer: Arc<dyn RelevanceScorer>,
    generators: Arc<dyn GeneratorSource>,
    detector: Arc<dyn ReferenceDetector>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        scorer: Arc<dyn RelevanceScorer>,
        generators: Arc<dyn GeneratorSource>,
        detector: Arc<dyn ReferenceDetector>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            scorer,
            generators,
            detector,
            settings,
        }
    }

    /// Build every service named by `config` around `store`.
    pub fn from_config(config: &Config, store: Arc<dyn VectorStore>) -> Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let scorer = rerank::create_scorer(&config.reranker)?;
        let generators = Arc::new(GeneratorFactory::new(config.generation.clone()));
        Ok(Self::new(
            embedder,
            store,
            scorer,
            generators,
            Arc::new(PatternDetector::default()),
            PipelineSettings::from_config(config)?,
        ))
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn generators(&self) -> &dyn GeneratorSource {
        self.generators.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer `question` against `workspace`.
    ///
    /// Never fails: every degradation is reported in the response.
    pub async fn ask(
        &self,
        workspace: &str,
        question: &str,
        history: &[Turn],
        options: &AskOptions,
    ) -> QueryResponse {
        let strategy = options.strategy.unwrap_or(self.settings.strategy);
        let mut params = self.settings.retrieval.clone();
        if let Some(k) = options.k {
            params.k_target = k.max(1);
        }
        let mut diagnostics = Diagnostics {
            standalone_question: question.to_string(),
            strategy: strategy.as_str().to_string(),
            ..Default::default()
        };

        let generator = match self.generators.generator(options.credential.as_deref()) {
            Ok(generator) => generator,
            Err(e) => return credential_failure(e, diagnostics),
        };

        let standalone = self.contextualize(generator.as_ref(), question, history).await;
        if let Some(w) = standalone.warning {
            diagnostics.warnings.push(w);
        }
        diagnostics.contextualization_attempted = standalone.attempted;
        diagnostics.contextualized = standalone.rewritten;
        diagnostics.standalone_question = standalone.question.clone();

        let recall = self
            .recall(generator.as_ref(), strategy, &standalone.question, &mut diagnostics)
            .await;

        let retrieval = self
            .retrieve(workspace, &standalone.question, &recall, &params)
            .await;
        diagnostics.retrieved = retrieval.initial_count;
        diagnostics.used = retrieval.candidates.len();
        diagnostics.warnings.extend(retrieval.warnings.iter().cloned());

        if retrieval.candidates.is_empty() {
            debug!(workspace, "no candidates, answering not found");
            return QueryResponse::not_found(diagnostics);
        }

        let synthesis = self
            .synthesize(generator.as_ref(), question, &retrieval, history)
            .await;
        if synthesis.failed {
            diagnostics
                .warnings
                .push("answer generation failed".to_string());
        }

        QueryResponse {
            answer: synthesis.answer,
            sources: synthesis.sources,
            diagnostics,
        }
    }

    async fn contextualize(
        &self,
        generator: &dyn Generator,
        question: &str,
        history: &[Turn],
    ) -> Contextualized {
        let stage = contextualize(
            generator,
            self.detector.as_ref(),
            question,
            history,
            self.settings.max_turns,
        );
        match timeout(self.settings.stage_timeout, stage).await {
            Ok(result) => result,
            Err(_) => {
                warn!("contextualization timed out, using raw question");
                Contextualized::fallback(question, self.timed_out("contextualization"))
            }
        }
    }

    async fn recall(
        &self,
        generator: &dyn Generator,
        strategy: RetrievalStrategy,
        question: &str,
        diagnostics: &mut Diagnostics,
    ) -> Recall {
        if strategy == RetrievalStrategy::Standard {
            return Recall::Question;
        }
        match timeout(
            self.settings.stage_timeout,
            hypothetical_passage(generator, question),
        )
        .await
        {
            Ok(Ok(passage)) => Recall::Hypothetical(passage),
            Ok(Err(e)) => {
                warn!(error = %e, "hypothetical passage failed, using standard recall");
                diagnostics
                    .warnings
                    .push(format!("hypothetical passage failed: {e}"));
                Recall::Question
            }
            Err(_) => {
                warn!("hypothetical passage timed out, using standard recall");
                diagnostics
                    .warnings
                    .push(self.timed_out("hypothetical passage"));
                Recall::Question
            }
        }
    }

    async fn retrieve(
        &self,
        workspace: &str,
        question: &str,
        recall: &Recall,
        params: &RetrievalParams,
    ) -> Retrieval {
        let services = RetrievalServices {
            embedder: self.embedder.as_ref(),
            store: self.store.as_ref(),
            scorer: self.scorer.as_ref(),
        };
        match timeout(
            self.settings.stage_timeout,
            retrieve(services, workspace, question, recall, params),
        )
        .await
        {
            Ok(retrieval) => retrieval,
            Err(_) => {
                warn!(workspace, "retrieval timed out");
                Retrieval {
                    warnings: vec![self.timed_out("retrieval")],
                    ..Default::default()
                }
            }
        }
    }

    async fn synthesize(
        &self,
        generator: &dyn Generator,
        question: &str,
        retrieval: &Retrieval,
        history: &[Turn],
    ) -> Synthesis {
        let stage = synthesize(
            generator,
            question,
            &retrieval.candidates,
            history,
            &self.settings.synthesis,
        );
        match timeout(self.settings.stage_timeout, stage).await {
            Ok(synthesis) => synthesis,
            Err(_) => {
                warn!(model = generator.model_name(), "answer generation timed out");
                Synthesis {
                    answer: format!(
                        "Error while calling {}: {}",
                        generator.model_name(),
                        self.timed_out("generation")
                    ),
                    sources: collect_sources(&retrieval.candidates),
                    failed: true,
                }
            }
        }
    }

    fn timed_out(&self, stage: &str) -> String {
        format!(
            "{stage} timed out after {}s",
            self.settings.stage_timeout.as_secs_f64()
        )
    }
}

fn credential_failure(error: GenerationError, mut diagnostics: Diagnostics) -> QueryResponse {
    warn!(error = %error, "no generator available");
    let answer = match &error {
        GenerationError::MissingCredential { .. } => format!(
            "An API key is required to answer questions. {error}. \
             (Vui lòng cung cấp API key để đặt câu hỏi.)"
        ),
        GenerationError::Backend(_) => format!("Answer generation is unavailable: {error}"),
    };
    diagnostics.warnings.push(error.to_string());
    QueryResponse {
        answer,
        sources: Vec::new(),
        diagnostics,
    }
}
