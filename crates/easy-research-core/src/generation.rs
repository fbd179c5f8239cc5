//! Text generation trait and credential resolution.
//!
//! Every chat backend (Groq, OpenAI, Ollama) sits behind [`Generator`].
//! Generators are obtained per request from a [`GeneratorSource`] so a
//! caller-supplied API key can override the configured one.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::Turn;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete a conversation. `system` is the instruction; `messages` are
    /// the turns that follow it, last one usually from the user.
    async fn generate(&self, system: &str, messages: &[Turn]) -> Result<String>;
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// No API key from the request nor from the environment.
    #[error("no API key configured for {provider}: pass one with the request or set {env_var}")]
    MissingCredential { provider: String, env_var: String },
    #[error("generation backend error: {0}")]
    Backend(String),
}

/// Produces a [`Generator`] bound to a credential.
pub trait GeneratorSource: Send + Sync {
    /// `credential` is the per-request key, if any. Blank keys count as absent.
    fn generator(&self, credential: Option<&str>) -> Result<Arc<dyn Generator>, GenerationError>;
}

/// Pick the effective credential: the request key wins over the fallback.
/// Blank or whitespace-only values are treated as absent.
pub fn resolve_credential(request: Option<&str>, fallback: Option<&str>) -> Option<String> {
    request
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| fallback.map(str::trim).filter(|k| !k.is_empty()))
        .map(str::to_string)
}

/// A source that always hands out the same generator, ignoring credentials.
pub struct SharedGenerator(pub Arc<dyn Generator>);

impl GeneratorSource for SharedGenerator {
    fn generator(&self, _credential: Option<&str>) -> Result<Arc<dyn Generator>, GenerationError> {
        Ok(self.0.clone())
    }
}
