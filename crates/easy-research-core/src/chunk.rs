//! Two-level (parent/child) recursive text chunker.
//!
//! Splits a [`SourceDocument`] into coarse [`ParentChunk`]s and then splits
//! every parent independently into fine [`ChildChunk`]s. Children are what
//! gets embedded and searched; parents are what the answer synthesizer reads.
//!
//! # Algorithm
//!
//! Both levels use the same [`RecursiveSplitter`]:
//!
//! 1. Pick the highest-priority separator that occurs in the text (the empty
//!    separator always matches and splits into characters).
//! 2. Split on it, keeping the separator at the start of the following piece.
//! 3. Accumulate pieces shorter than the size budget; a piece at or over the
//!    budget flushes the accumulated run and is split again with the
//!    lower-priority separators.
//! 4. Accumulated runs are merged greedily up to `size` characters, with up
//!    to `overlap` characters carried over into the next chunk.
//!
//! Sizes count Unicode scalar values, not bytes.
//!
//! # Example
//!
//! ```rust
//! use easy_research_core::chunk::{chunk_document, SplitPolicy};
//! use easy_research_core::models::SourceDocument;
//!
//! let doc = SourceDocument::new("notes.txt", "Hello world.\n\nSecond paragraph.");
//! let chunks = chunk_document(&doc, &SplitPolicy::for_kind(doc.kind));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].parent_content, chunks[0].text);
//! ```

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{ChildChunk, ParentChunk, SourceDocument};

/// Separators for prose documents (pdf, docx).
const DOCUMENT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];
/// Separators for source code, biased toward class/function boundaries.
const CODE_SEPARATORS: &[&str] = &["\nclass ", "\ndef ", "\nfunction ", "\n\n", "\n", " "];
/// Separators for line/record oriented data.
const STRUCTURED_SEPARATORS: &[&str] = &["\n", "},", "],", " "];
const GENERIC_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Declared document type. Selects the [`SplitPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Books, reports, papers.
    Document,
    /// Source code.
    Code,
    /// JSON, CSV, XML.
    Structured,
    /// Anything unrecognized.
    Generic,
}

impl DocumentKind {
    /// Classify a file by its extension (case-insensitive).
    pub fn from_filename(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" | "docx" | "doc" => DocumentKind::Document,
            "py" | "js" | "ts" | "java" | "cpp" | "c" | "h" | "cs" | "go" | "rs" | "rb" | "php"
            | "html" => DocumentKind::Code,
            "json" | "csv" | "tsv" | "xml" => DocumentKind::Structured,
            _ => DocumentKind::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Document => "document",
            DocumentKind::Code => "code",
            DocumentKind::Structured => "structured",
            DocumentKind::Generic => "generic",
        }
    }
}

/// Invalid splitter parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("chunk size must be > 0")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must not exceed chunk size ({size})")]
    OverlapExceedsSize { size: usize, overlap: usize },
    #[error("at least one separator is required")]
    NoSeparators,
}

/// Separator-priority recursive splitter with character-based budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveSplitter {
    size: usize,
    overlap: usize,
    separators: &'static [&'static str],
}

impl RecursiveSplitter {
    /// Create a splitter, rejecting `size == 0` and `overlap > size`.
    pub fn new(
        size: usize,
        overlap: usize,
        separators: &'static [&'static str],
    ) -> Result<Self, SplitError> {
        if size == 0 {
            return Err(SplitError::ZeroSize);
        }
        if overlap > size {
            return Err(SplitError::OverlapExceedsSize { size, overlap });
        }
        if separators.is_empty() {
            return Err(SplitError::NoSeparators);
        }
        Ok(Self::fixed(size, overlap, separators))
    }

    /// Built-in policies only; parameters are valid by construction.
    const fn fixed(size: usize, overlap: usize, separators: &'static [&'static str]) -> Self {
        Self {
            size,
            overlap,
            separators,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into trimmed, non-empty chunks of at most `size`
    /// characters (a single unsplittable token may exceed it when the
    /// separator list has no empty separator).
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, self.separators, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let (separator, remaining) =
            match separators.iter().position(|s| s.is_empty() || text.contains(s)) {
                Some(i) => (separators[i], &separators[i + 1..]),
                None => (separators.last().copied().unwrap_or(""), &separators[..0]),
            };

        let mut run: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.size {
                run.push(piece);
                continue;
            }
            if !run.is_empty() {
                self.merge(&run, out);
                run.clear();
            }
            if remaining.is_empty() {
                push_trimmed(out, piece);
            } else {
                self.split_recursive(piece, remaining, out);
            }
        }
        if !run.is_empty() {
            self.merge(&run, out);
        }
    }

    /// Greedily join adjacent pieces up to `size`, carrying at most
    /// `overlap` characters of the previous chunk into the next one.
    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.size && !current.is_empty() {
                push_joined(out, &current);
                while total > self.overlap || (total + len > self.size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }

        if !current.is_empty() {
            push_joined(out, &current);
        }
    }
}

/// Parent and child splitters for one document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPolicy {
    pub parent: RecursiveSplitter,
    pub child: RecursiveSplitter,
}

impl SplitPolicy {
    /// Built-in policy for a document kind.
    pub fn for_kind(kind: DocumentKind) -> Self {
        let (parent, child) = match kind {
            DocumentKind::Document => (
                RecursiveSplitter::fixed(2500, 300, DOCUMENT_SEPARATORS),
                RecursiveSplitter::fixed(500, 80, DOCUMENT_SEPARATORS),
            ),
            DocumentKind::Code => (
                RecursiveSplitter::fixed(1500, 100, CODE_SEPARATORS),
                RecursiveSplitter::fixed(400, 30, CODE_SEPARATORS),
            ),
            DocumentKind::Structured => (
                RecursiveSplitter::fixed(1000, 50, STRUCTURED_SEPARATORS),
                RecursiveSplitter::fixed(300, 0, STRUCTURED_SEPARATORS),
            ),
            DocumentKind::Generic => (
                RecursiveSplitter::fixed(2000, 200, GENERIC_SEPARATORS),
                RecursiveSplitter::fixed(400, 50, GENERIC_SEPARATORS),
            ),
        };
        Self { parent, child }
    }

    pub fn new(parent: RecursiveSplitter, child: RecursiveSplitter) -> Self {
        Self { parent, child }
    }
}

/// Split a document into parent chunks, recording each parent's character
/// offset in the document.
pub fn split_parents(doc: &SourceDocument, policy: &SplitPolicy) -> Vec<ParentChunk> {
    if doc.text.trim().is_empty() {
        return Vec::new();
    }

    let mut parents = Vec::new();
    // (byte, char) position of the previous parent's start
    let mut cursor = (0usize, 0usize);

    for (index, text) in policy.parent.split(&doc.text).into_iter().enumerate() {
        let search_from = if index == 0 {
            0
        } else {
            next_char_boundary(&doc.text, cursor.0)
        };
        let byte = doc.text[search_from..]
            .find(text.as_str())
            .map(|pos| search_from + pos)
            .unwrap_or(cursor.0);
        let offset = if byte >= cursor.0 {
            cursor.1 + char_len(&doc.text[cursor.0..byte])
        } else {
            cursor.1
        };
        cursor = (byte.max(cursor.0), offset);

        parents.push(ParentChunk {
            index,
            source: doc.filename.clone(),
            text,
            offset,
        });
    }

    parents
}

/// Split a document into child chunks, each stamped with its parent's text,
/// indices, and a deterministic id.
///
/// Empty or whitespace-only documents produce no chunks. Child boundaries
/// are computed per parent; overlap never crosses a parent boundary.
pub fn chunk_document(doc: &SourceDocument, policy: &SplitPolicy) -> Vec<ChildChunk> {
    let mut children = Vec::new();

    for parent in split_parents(doc, policy) {
        for (child_index, text) in policy.child.split(&parent.text).into_iter().enumerate() {
            children.push(ChildChunk {
                id: child_id(&parent.source, parent.index, child_index),
                source: parent.source.clone(),
                text,
                parent_index: parent.index,
                child_index,
                chunk_index: children.len(),
                parent_content: parent.text.clone(),
                parent_offset: parent.offset,
            });
        }
    }

    children
}

/// Content-addressed child id: SHA-256 of `"{source}_p{parent}_c{child}"`.
pub fn child_id(source: &str, parent_index: usize, child_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}_p{}_c{}", source, parent_index, child_index).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split on `separator`, attaching each occurrence to the start of the
/// piece that follows it. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_joined(out: &mut Vec<String>, pieces: &VecDeque<(&str, usize)>) {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    push_trimmed(out, &joined);
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn next_char_boundary(s: &str, index: usize) -> usize {
    s[index..]
        .chars()
        .next()
        .map(|c| index + c.len_utf8())
        .unwrap_or(s.len())
}
