//! Core data models shared by ingestion and the query pipeline.
//!
//! These types represent the documents, chunks, conversation turns, and
//! per-query candidates that flow through EasyResearch. Everything here is
//! plain data: no I/O, no service handles.

use serde::{Deserialize, Serialize};

use crate::chunk::DocumentKind;

/// A document handed to the chunker: extracted text plus its declared kind.
///
/// Created by the upload/administration layer, consumed entirely by
/// [`chunk_document`](crate::chunk::chunk_document), then dropped.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name (no directory), used as the `source` of every chunk.
    pub filename: String,
    /// Declared document kind, selects the splitting policy.
    pub kind: DocumentKind,
    /// Extracted UTF-8 text.
    pub text: String,
}

impl SourceDocument {
    /// Build a document, deriving its kind from the file extension.
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let filename = filename.into();
        let kind = DocumentKind::from_filename(&filename);
        Self {
            filename,
            kind,
            text: text.into(),
        }
    }
}

/// A coarse span of a document. Used only as answer context, never indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChunk {
    pub index: usize,
    pub source: String,
    pub text: String,
    /// Character offset of the span start within the document text.
    pub offset: usize,
}

/// A fine-grained, indexed span carved out of a [`ParentChunk`].
///
/// `id` is the lowercase hex SHA-256 of `"{source}_p{parent_index}_c{child_index}"`,
/// so re-ingesting the same file with the same policy overwrites instead of
/// duplicating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildChunk {
    pub id: String,
    pub source: String,
    pub text: String,
    pub parent_index: usize,
    pub child_index: usize,
    /// Position of this child across the whole document.
    pub chunk_index: usize,
    /// Full text of the owning parent chunk.
    pub parent_content: String,
    pub parent_offset: usize,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message of a conversation. Also the message type sent to generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How a candidate entered the recall set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Similarity search on the standalone question.
    Vector,
    /// Similarity search on a generated hypothetical answer passage.
    Hypothetical,
}

/// Scores attached to one candidate for one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    /// Raw similarity reported by the vector store.
    pub similarity: f64,
    /// BM25 score normalized to `[0, 1]` within the recall batch.
    pub lexical: f64,
    /// Pairwise relevance from the cross-encoder.
    pub relevance: f64,
    /// Weighted fusion of `relevance` and `lexical`.
    pub hybrid: f64,
}

/// A child chunk paired with its per-query scores. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub chunk: ChildChunk,
    pub scores: Scores,
    pub method: RetrievalMethod,
    /// Zero-based position in the similarity ranking.
    pub recall_rank: usize,
}

/// Per-request counters and flags returned alongside an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Passages returned by the similarity search.
    pub retrieved: usize,
    /// Candidates handed to the synthesizer.
    pub used: usize,
    /// Whether the follow-up trigger fired and a rewrite was requested.
    pub contextualization_attempted: bool,
    /// Whether retrieval used a rewritten question. False when the rewrite
    /// was skipped, failed, or returned the question unchanged.
    pub contextualized: bool,
    /// The query used for retrieval.
    pub standalone_question: String,
    pub strategy: String,
    /// Degradations encountered (timeouts, failed external calls).
    pub warnings: Vec<String>,
}

/// The structured result of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// Answer text used when nothing relevant was retrieved.
pub const NOT_FOUND_ANSWER: &str = "I could not find this information in the workspace documents. \
(Tôi không tìm thấy thông tin này trong tài liệu.)";

impl QueryResponse {
    /// The explicit "nothing found" result. Not an error.
    pub fn not_found(diagnostics: Diagnostics) -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            sources: Vec::new(),
            diagnostics,
        }
    }

    /// Whether this response is the "nothing found" result.
    pub fn is_not_found(&self) -> bool {
        self.sources.is_empty() && self.answer == NOT_FOUND_ANSWER
    }
}
