//! Conversational query rewriting.
//!
//! A follow-up such as "And for international orders?" cannot be retrieved
//! on its own. When the conversation already holds an exchange and the
//! question looks like it refers back to it, the generator rewrites the
//! question into a standalone form. Self-contained questions never cost a
//! generation call.
//!
//! # Trigger
//!
//! | Condition | Source |
//! |-----------|--------|
//! | at least one user turn and one assistant turn in history | conversation |
//! | `detector.needs_context(question)` | [`ReferenceDetector`] |
//!
//! Any failure falls back to the raw question.

use tracing::{debug, warn};

use crate::bm25::tokenize;
use crate::generation::Generator;
use crate::models::{Role, Turn};

/// Decides whether a question refers to earlier conversation.
pub trait ReferenceDetector: Send + Sync {
    fn needs_context(&self, question: &str) -> bool;
}

impl<F> ReferenceDetector for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn needs_context(&self, question: &str) -> bool {
        self(question)
    }
}

/// Word-pattern detector for English and Vietnamese follow-ups.
///
/// Matches on whole tokens, so "item" does not trigger on "it".
#[derive(Debug, Clone)]
pub struct PatternDetector {
    /// Pronouns and demonstratives, matched anywhere.
    pub references: Vec<String>,
    /// Follow-up openers, matched at the start of the question.
    pub openers: Vec<String>,
    /// Follow-up phrases, matched anywhere.
    pub phrases: Vec<String>,
}

const REFERENCES: &[&str] = &[
    "it", "its", "that", "this", "these", "those", "they", "them", "their", "he", "she", "him",
    "her", "nó", "đó", "ấy", "này", "kia", "họ", "chúng",
];

const OPENERS: &[&str] = &[
    "and",
    "also",
    "but",
    "what about",
    "how about",
    "còn",
    "thế còn",
    "vậy",
    "và",
];

const PHRASES: &[&str] = &[
    "tell me more",
    "more details",
    "the same",
    "mentioned above",
    "thì sao",
    "nữa không",
    "nói thêm",
    "chi tiết hơn",
];

impl Default for PatternDetector {
    fn default() -> Self {
        let own = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            references: own(REFERENCES),
            openers: own(OPENERS),
            phrases: own(PHRASES),
        }
    }
}

impl ReferenceDetector for PatternDetector {
    fn needs_context(&self, question: &str) -> bool {
        let tokens = tokenize(question);
        if tokens.is_empty() {
            return false;
        }
        if tokens.iter().any(|t| self.references.contains(t)) {
            return true;
        }
        let starts_with = |pattern: &str| {
            let pattern = tokenize(pattern);
            !pattern.is_empty() && tokens.starts_with(&pattern)
        };
        if self.openers.iter().any(|o| starts_with(o)) {
            return true;
        }
        let padded = format!(" {} ", tokens.join(" "));
        self.phrases.iter().any(|p| {
            let p = tokenize(p);
            !p.is_empty() && padded.contains(&format!(" {} ", p.join(" ")))
        })
    }
}

/// Outcome of contextualization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contextualized {
    /// The question to use for retrieval.
    pub question: String,
    /// Whether the trigger fired and a rewrite was requested, whatever
    /// its outcome.
    pub attempted: bool,
    /// Whether `question` differs from the caller's question.
    pub rewritten: bool,
    /// Set when a rewrite was attempted and failed.
    pub warning: Option<String>,
}

impl Contextualized {
    /// The trigger did not fire.
    pub fn unchanged(question: &str) -> Self {
        Self {
            question: question.to_string(),
            attempted: false,
            rewritten: false,
            warning: None,
        }
    }

    /// A rewrite was attempted but produced nothing usable.
    pub fn fallback(question: &str, warning: String) -> Self {
        Self {
            attempted: true,
            warning: Some(warning),
            ..Self::unchanged(question)
        }
    }
}

pub const DEFAULT_MAX_TURNS: usize = 10;

const REWRITE_INSTRUCTION: &str = "Given the conversation history and the latest user question, \
which may reference the history, rewrite the latest question as a standalone question that can be \
understood without the history. Resolve pronouns and references to the topics they point to. \
Keep the language of the latest question (Vietnamese or English). Do NOT answer the question. \
Return only the rewritten question, or the question unchanged if it is already standalone.";

/// Whether the history holds a prior exchange.
pub fn has_exchange(history: &[Turn]) -> bool {
    history.iter().any(|t| t.role == Role::User) && history.iter().any(|t| t.role == Role::Assistant)
}

/// Rewrite `question` using `history` when it needs it.
pub async fn contextualize(
    generator: &dyn Generator,
    detector: &dyn ReferenceDetector,
    question: &str,
    history: &[Turn],
    max_turns: usize,
) -> Contextualized {
    if !has_exchange(history) || !detector.needs_context(question) {
        return Contextualized::unchanged(question);
    }

    let start = history.len().saturating_sub(max_turns);
    let mut messages: Vec<Turn> = history[start..].to_vec();
    messages.push(Turn::user(question));

    match generator.generate(REWRITE_INSTRUCTION, &messages).await {
        Ok(output) => {
            let rewritten = clean_rewrite(&output);
            if rewritten.is_empty() {
                warn!("contextualization returned empty output, using raw question");
                return Contextualized::fallback(question, "contextualization returned no text".into());
            }
            debug!(original = question, standalone = %rewritten, "question contextualized");
            Contextualized {
                attempted: true,
                rewritten: rewritten != question,
                question: rewritten,
                warning: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "contextualization failed, using raw question");
            Contextualized::fallback(question, format!("contextualization failed: {e}"))
        }
    }
}

fn clean_rewrite(output: &str) -> String {
    let trimmed = output.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
