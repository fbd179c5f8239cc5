//! Chat generation clients.
//!
//! Concrete backends for the core
//! [`Generator`](easy_research_core::generation::Generator) trait, and the
//! [`GeneratorFactory`] that binds a backend to a per-request credential.
//!
//! | Config Value | Endpoint | Credential |
//! |-------------|----------|------------|
//! | `"groq"` | `https://api.groq.com/openai/v1/chat/completions` | required |
//! | `"openai"` | `https://api.openai.com/v1/chat/completions` | required |
//! | `"ollama"` | `{url}/api/chat` (default `http://localhost:11434`) | none |
//!
//! The credential is the key passed with the request if it is non-blank,
//! otherwise the environment variable named by `generation.api_key_env`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use easy_research_core::generation::{
    resolve_credential, GenerationError, Generator, GeneratorSource,
};
use easy_research_core::models::Turn;

use crate::config::GenerationConfig;
use crate::http;

/// Wire format of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    /// OpenAI-compatible `/chat/completions` (Groq, OpenAI).
    ChatCompletions,
    /// Ollama `/api/chat`.
    OllamaChat,
}

/// A chat model bound to one credential.
pub struct ChatGenerator {
    backend: Backend,
    label: &'static str,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

#[async_trait]
impl Generator for ChatGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, messages: &[Turn]) -> Result<String> {
        let body = request_body(
            self.backend,
            &self.model,
            system,
            messages,
            self.temperature,
            self.max_tokens,
        );
        let json = http::post_json_with_retry(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            self.label,
        )
        .await?;
        parse_response(self.backend, &json)
    }
}

fn wire_messages(system: &str, messages: &[Turn]) -> Vec<serde_json::Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(serde_json::json!({ "role": "system", "content": system }));
    for turn in messages {
        out.push(serde_json::json!({ "role": turn.role, "content": turn.content }));
    }
    out
}

fn request_body(
    backend: Backend,
    model: &str,
    system: &str,
    messages: &[Turn],
    temperature: f32,
    max_tokens: u32,
) -> serde_json::Value {
    let messages = wire_messages(system, messages);
    match backend {
        Backend::ChatCompletions => serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        }),
        Backend::OllamaChat => serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        }),
    }
}

fn parse_response(backend: Backend, json: &serde_json::Value) -> Result<String> {
    let content = match backend {
        Backend::ChatCompletions => json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content")),
        Backend::OllamaChat => json.get("message").and_then(|m| m.get("content")),
    };
    content
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid chat response: missing message content"))
}

/// Builds [`ChatGenerator`]s from configuration, one per request.
pub struct GeneratorFactory {
    config: GenerationConfig,
}

impl GeneratorFactory {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    fn needs_credential(&self) -> bool {
        self.config.provider != "ollama"
    }

    fn build(&self, api_key: Option<String>) -> Result<ChatGenerator, GenerationError> {
        let c = &self.config;
        let (backend, label, default_url) = match c.provider.as_str() {
            "groq" => (
                Backend::ChatCompletions,
                "Groq API",
                "https://api.groq.com/openai/v1",
            ),
            "openai" => (
                Backend::ChatCompletions,
                "OpenAI API",
                "https://api.openai.com/v1",
            ),
            "ollama" => (Backend::OllamaChat, "Ollama API", "http://localhost:11434"),
            other => {
                return Err(GenerationError::Backend(format!(
                    "unknown generation provider: {other}"
                )))
            }
        };
        let base = c.url.as_deref().unwrap_or(default_url).trim_end_matches('/');
        let endpoint = match backend {
            Backend::ChatCompletions => format!("{base}/chat/completions"),
            Backend::OllamaChat => format!("{base}/api/chat"),
        };
        let client =
            http::client(c.timeout_secs).map_err(|e| GenerationError::Backend(e.to_string()))?;

        Ok(ChatGenerator {
            backend,
            label,
            endpoint,
            model: c.model.clone(),
            api_key,
            temperature: c.temperature,
            max_tokens: c.max_tokens,
            max_retries: c.max_retries,
            client,
        })
    }
}

impl GeneratorSource for GeneratorFactory {
    fn generator(&self, credential: Option<&str>) -> Result<Arc<dyn Generator>, GenerationError> {
        let env_key = std::env::var(&self.config.api_key_env).ok();
        let api_key = resolve_credential(credential, env_key.as_deref());
        if api_key.is_none() && self.needs_credential() {
            return Err(GenerationError::MissingCredential {
                provider: self.config.provider.clone(),
                env_var: self.config.api_key_env.clone(),
            });
        }
        Ok(Arc::new(self.build(api_key)?))
    }
}
