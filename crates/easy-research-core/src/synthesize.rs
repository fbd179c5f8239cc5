//! Answer synthesis from parent-chunk context.
//!
//! Retrieval ranks small child spans; the answer is written from their
//! wider parent spans. Each selected candidate contributes its parent text,
//! labelled with its source file, in candidate order:
//!
//! ```text
//! [Source: policy.pdf]
//! <parent content>
//!
//! ---
//!
//! [Source: faq.md]
//! <parent content>
//! ```
//!
//! A short transcript of recent turns is appended to the system
//! instruction when the conversation has more than one turn.

use tracing::{debug, warn};

use crate::generation::Generator;
use crate::models::{Candidate, Turn, NOT_FOUND_ANSWER};

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisParams {
    /// Number of most recent turns included in the history summary.
    pub history_turns: usize,
    /// Per-turn character cap in the history summary.
    pub turn_char_cap: usize,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            history_turns: 6,
            turn_char_cap: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub answer: String,
    /// Distinct source filenames, first-seen order.
    pub sources: Vec<String>,
    /// Whether `answer` carries a generation error instead of an answer.
    pub failed: bool,
}

const ANSWER_INSTRUCTION: &str = "You are a helpful AI assistant. \
Answer the user's question based ONLY on the provided context below. \
If the answer is not in the context, simply say you don't know in the user's language. \
Do not make up information.\n\n\
IMPORTANT: Detect the language of the user's question (Vietnamese or English) and answer in that SAME language.";

/// Concatenate parent contexts labelled with their source.
pub fn build_context(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("[Source: {}]\n{}", c.chunk.source, c.chunk.parent_content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Role-labelled transcript of the last turns, or `None` for a history of
/// zero or one turn.
pub fn summarize_history(history: &[Turn], params: &SynthesisParams) -> Option<String> {
    if history.len() <= 1 {
        return None;
    }
    let start = history.len().saturating_sub(params.history_turns);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), truncate_chars(&t.content, params.turn_char_cap)))
        .collect();
    Some(lines.join("\n"))
}

fn truncate_chars(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}

/// System instruction with the optional history summary appended.
pub fn system_instruction(history_summary: Option<&str>) -> String {
    match history_summary {
        Some(summary) => format!("{ANSWER_INSTRUCTION}\n\nConversation so far:\n{summary}"),
        None => ANSWER_INSTRUCTION.to_string(),
    }
}

/// Distinct source filenames in first-seen order.
pub fn collect_sources(candidates: &[Candidate]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for c in candidates {
        if !sources.contains(&c.chunk.source) {
            sources.push(c.chunk.source.clone());
        }
    }
    sources
}

/// Produce an answer to `question` from `candidates`.
///
/// Always returns a result: a generation failure becomes the answer text
/// with `failed` set. No candidates yields the not-found answer without a
/// generation call.
pub async fn synthesize(
    generator: &dyn Generator,
    question: &str,
    candidates: &[Candidate],
    history: &[Turn],
    params: &SynthesisParams,
) -> Synthesis {
    if candidates.is_empty() {
        return Synthesis {
            answer: NOT_FOUND_ANSWER.to_string(),
            sources: Vec::new(),
            failed: false,
        };
    }

    let context = build_context(candidates);
    let summary = summarize_history(history, params);
    let system = system_instruction(summary.as_deref());
    let message = Turn::user(format!("Context:\n{context}\n\nQuestion:\n{question}"));
    let sources = collect_sources(candidates);

    debug!(
        candidates = candidates.len(),
        context_chars = context.chars().count(),
        with_history = summary.is_some(),
        "synthesizing answer"
    );

    match generator.generate(&system, std::slice::from_ref(&message)).await {
        Ok(answer) => Synthesis {
            answer: answer.trim().to_string(),
            sources,
            failed: false,
        },
        Err(e) => {
            warn!(error = %e, model = generator.model_name(), "answer generation failed");
            Synthesis {
                answer: format!("Error while calling {}: {e}", generator.model_name()),
                sources,
                failed: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChildChunk, RetrievalMethod, Scores};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        fail: bool,
        seen: Mutex<Vec<(String, Vec<Turn>)>>,
    }

    impl Recorder {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }
        async fn generate(&self, system: &str, messages: &[Turn]) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), messages.to_vec()));
            if self.fail {
                bail!("rate limited");
            }
            Ok("  Refunds take 30 days.  ".to_string())
        }
    }

    fn candidate(source: &str, parent: &str) -> Candidate {
        Candidate {
            chunk: ChildChunk {
                id: format!("{source}:{parent}"),
                source: source.to_string(),
                text: "child".to_string(),
                parent_index: 0,
                child_index: 0,
                chunk_index: 0,
                parent_content: parent.to_string(),
                parent_offset: 0,
            },
            scores: Scores {
                similarity: 0.5,
                lexical: 0.5,
                relevance: 0.5,
                hybrid: 0.5,
            },
            method: RetrievalMethod::Vector,
            recall_rank: 0,
        }
    }

    #[test]
    fn test_build_context_uses_parent_content() {
        let ctx = build_context(&[candidate("a.pdf", "Parent A"), candidate("b.md", "Parent B")]);
        assert_eq!(ctx, "[Source: a.pdf]\nParent A\n\n---\n\n[Source: b.md]\nParent B");
    }

    #[test]
    fn test_history_summary_omitted_for_single_turn() {
        let p = SynthesisParams::default();
        assert!(summarize_history(&[], &p).is_none());
        assert!(summarize_history(&[Turn::user("hi")], &p).is_none());
    }

    #[test]
    fn test_history_summary_bounded_and_truncated() {
        let p = SynthesisParams {
            history_turns: 2,
            turn_char_cap: 5,
        };
        let history = vec![
            Turn::user("first question"),
            Turn::assistant("first answer"),
            Turn::user("second"),
            Turn::assistant("ok"),
        ];
        let summary = summarize_history(&history, &p).unwrap();
        assert_eq!(summary, "User: secon...\nAssistant: ok");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_chars("tiếng việt", 5), "tiếng...");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn test_sources_dedup_first_seen() {
        let sources = collect_sources(&[
            candidate("b.md", "1"),
            candidate("a.pdf", "2"),
            candidate("b.md", "3"),
        ]);
        assert_eq!(sources, vec!["b.md", "a.pdf"]);
    }

    #[tokio::test]
    async fn test_synthesize_success() {
        let g = Recorder::new(false);
        let history = vec![Turn::user("q1"), Turn::assistant("a1")];
        let out = synthesize(
            &g,
            "How long for refunds?",
            &[candidate("policy.pdf", "Refunds within 30 days.")],
            &history,
            &SynthesisParams::default(),
        )
        .await;
        assert_eq!(out.answer, "Refunds take 30 days.");
        assert_eq!(out.sources, vec!["policy.pdf"]);
        assert!(!out.failed);

        let seen = g.seen.lock().unwrap();
        let (system, messages) = &seen[0];
        assert!(system.contains("User: q1\nAssistant: a1"));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.contains("[Source: policy.pdf]\nRefunds within 30 days."));
        assert!(messages[0].content.ends_with("Question:\nHow long for refunds?"));
    }

    #[tokio::test]
    async fn test_synthesize_failure_becomes_answer() {
        let g = Recorder::new(true);
        let out = synthesize(
            &g,
            "q",
            &[candidate("a.pdf", "p")],
            &[],
            &SynthesisParams::default(),
        )
        .await;
        assert!(out.failed);
        assert!(out.answer.contains("rate limited"));
        assert_eq!(out.sources, vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn test_synthesize_without_candidates_skips_generation() {
        let g = Recorder::new(false);
        let out = synthesize(&g, "q", &[], &[], &SynthesisParams::default()).await;
        assert_eq!(out.answer, NOT_FOUND_ANSWER);
        assert!(out.sources.is_empty());
        assert!(g.seen.lock().unwrap().is_empty());
    }
}
