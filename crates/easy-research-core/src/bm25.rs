//! Okapi BM25 over a small, ad-hoc corpus.
//!
//! The retriever uses the recalled passages themselves as the reference
//! corpus, so document frequencies and average length are local to one
//! query. This is a reranking signal, not a global index.
//!
//! Negative IDF values (terms present in more than half of the corpus) are
//! floored at `epsilon × mean IDF`, matching the common `BM25Okapi`
//! formulation.

use std::collections::HashMap;

/// Term-frequency saturation.
pub const K1: f64 = 1.5;
/// Length normalization.
pub const B: f64 = 0.75;
/// Floor factor for negative IDF values.
pub const EPSILON: f64 = 0.25;

/// Lower-cased word tokens. Words are runs of Unicode alphanumerics or `_`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// A BM25 index over a fixed set of tokenized documents.
#[derive(Debug, Clone)]
pub struct Bm25 {
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25 {
    pub fn new<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut doc_freqs = Vec::with_capacity(documents.len());
        let mut doc_lens = Vec::with_capacity(documents.len());
        let mut containing: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = tokenize(doc.as_ref());
            doc_lens.push(tokens.len());
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *containing.entry(term.clone()).or_insert(0) += 1;
            }
            doc_freqs.push(freqs);
        }

        let n = documents.len() as f64;
        let total_len: usize = doc_lens.iter().sum();
        let avg_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / n
        };

        let mut idf: HashMap<String, f64> = containing
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term, ((n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        if !idf.is_empty() {
            let mean = idf.values().sum::<f64>() / idf.len() as f64;
            let floor = EPSILON * mean;
            for value in idf.values_mut() {
                if *value < 0.0 {
                    *value = floor;
                }
            }
        }

        Self {
            doc_freqs,
            doc_lens,
            avg_len,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Raw BM25 score of every document against `query`, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let terms = tokenize(query);
        self.doc_freqs
            .iter()
            .zip(self.doc_lens.iter())
            .map(|(freqs, &len)| {
                let norm = if self.avg_len > 0.0 {
                    1.0 - B + B * len as f64 / self.avg_len
                } else {
                    1.0
                };
                terms
                    .iter()
                    .map(|term| {
                        let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        idf * (tf * (K1 + 1.0)) / (tf + K1 * norm)
                    })
                    .sum()
            })
            .collect()
    }
}

/// Divide every score by the batch maximum and clamp to `[0, 1]`.
///
/// A non-positive maximum (including an empty query) yields all zeros.
pub fn normalize_by_max(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max > 0.0) {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s / max).clamp(0.0, 1.0)).collect()
}

/// Score `passages` against `query` with the passages as the corpus and
/// return normalized scores in passage order.
pub fn normalized_scores<S: AsRef<str>>(query: &str, passages: &[S]) -> Vec<f64> {
    if passages.is_empty() {
        return Vec::new();
    }
    normalize_by_max(&Bm25::new(passages).scores(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Refund-policy: 30 DAYS, e_mail!"),
            vec!["refund", "policy", "30", "days", "e_mail"]
        );
        assert_eq!(tokenize("Chính sách HOÀN tiền"), vec!["chính", "sách", "hoàn", "tiền"]);
        assert!(tokenize("  ,.;  ").is_empty());
    }

    #[test]
    fn test_matching_document_scores_highest() {
        let docs = [
            "Refunds are issued within 30 days of purchase.",
            "Shipping takes five business days.",
            "Our office is closed on public holidays.",
        ];
        let scores = Bm25::new(&docs).scores("how long do refunds take");
        assert!(scores[0] > scores[1]);
        assert!(scores[0] > scores[2]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_term_frequency_saturates() {
        let docs = ["refund", "refund refund refund refund", "shipping", "warranty"];
        let scores = Bm25::new(&docs).scores("refund");
        assert!(scores[1] > 0.0 && scores[0] > 0.0);
        assert!(scores[1] < scores[0] * 4.0);
    }

    #[test]
    fn test_common_terms_get_floored_idf() {
        let docs = ["the refund", "the shipping", "the warranty"];
        let bm25 = Bm25::new(&docs);
        let scores = bm25.scores("the");
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_empty_corpus() {
        let docs: [&str; 0] = [];
        let bm25 = Bm25::new(&docs);
        assert!(bm25.is_empty());
        assert!(bm25.scores("anything").is_empty());
        assert!(normalized_scores("anything", &docs).is_empty());
    }

    #[test]
    fn test_normalize_by_max() {
        let norm = normalize_by_max(&[2.0, 1.0, 0.0]);
        assert_eq!(norm, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_normalize_zero_max_is_all_zero() {
        assert_eq!(normalize_by_max(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(normalize_by_max(&[-1.0, -0.5]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_normalized_scores_in_unit_interval() {
        let docs = [
            "refund refund policy",
            "policy for international orders",
            "nothing relevant",
        ];
        let norm = normalized_scores("refund policy", &docs);
        assert_eq!(norm.len(), 3);
        assert!((norm.iter().copied().fold(0.0, f64::max) - 1.0).abs() < 1e-9);
        for s in norm {
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_query_without_tokens() {
        let docs = ["refund policy", "shipping"];
        assert_eq!(normalized_scores("?!", &docs), vec![0.0, 0.0]);
    }
}
