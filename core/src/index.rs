use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{EngineError, Result};

pub type DocumentId = String;

/// Token -> postings, one posting per distinct document containing the token.
/// Posting order is insertion (document) order and carries no ranking meaning.
pub type InvertedIndex = BTreeMap<String, Vec<Posting>>;

/// One token's occurrence record within one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    #[serde(alias = "loc")]
    pub document_id: DocumentId,
    /// Normalized local term frequency: occurrences / document token count.
    pub frequency: f64,
    /// Zero-based offsets into the document's token sequence, strictly increasing.
    #[serde(rename = "idx_list")]
    pub positions: Vec<u32>,
    /// Token appears inside a title, h1..h6 or b element.
    #[serde(rename = "tag_important")]
    pub important: bool,
    #[serde(rename = "tfidf")]
    pub weight: f64,
}

impl Posting {
    pub fn new(document_id: DocumentId, frequency: f64, positions: Vec<u32>, important: bool) -> Self {
        Self { document_id, frequency, positions, important, weight: 0.0 }
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Raw occurrence count of the token in its document.
    pub fn occurrences(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Size of the corpus at the collaborator boundary, skipped documents included.
    pub document_count: usize,
    pub vocabulary: BTreeSet<String>,
}

/// The finished index. Read-only once built or loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStore {
    index: InvertedIndex,
    stats: CorpusStats,
    documents: BTreeMap<DocumentId, DocMeta>,
}

impl IndexStore {
    pub fn new(index: InvertedIndex, stats: CorpusStats, documents: BTreeMap<DocumentId, DocMeta>) -> Self {
        Self { index, stats, documents }
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn stats(&self) -> &CorpusStats {
        &self.stats
    }

    pub fn documents(&self) -> &BTreeMap<DocumentId, DocMeta> {
        &self.documents
    }

    pub fn document(&self, document_id: &str) -> Option<&DocMeta> {
        self.documents.get(document_id)
    }

    pub fn document_count(&self) -> usize {
        self.stats.document_count
    }

    pub fn vocabulary(&self) -> &BTreeSet<String> {
        &self.stats.vocabulary
    }

    pub fn postings(&self, token: &str) -> Option<&[Posting]> {
        self.index.get(token).map(Vec::as_slice)
    }

    /// Number of documents containing `token`.
    pub fn document_frequency(&self, token: &str) -> usize {
        self.index.get(token).map_or(0, Vec::len)
    }

    /// `None` for tokens outside the index.
    pub fn idf(&self, token: &str) -> Option<f64> {
        match self.document_frequency(token) {
            0 => None,
            dft => Some(inverse_document_frequency(self.stats.document_count, dft)),
        }
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Checks the structural invariants a persisted index must satisfy.
    pub fn validate(&self) -> Result<()> {
        if !self.index.is_empty() && self.stats.document_count == 0 {
            return Err(corrupt("postings present but num_documents is 0".into()));
        }
        if self.stats.vocabulary.len() != self.index.len()
            || !self.index.keys().all(|token| self.stats.vocabulary.contains(token))
        {
            return Err(corrupt(format!(
                "unique_words lists {} tokens that do not match the {} index keys",
                self.stats.vocabulary.len(),
                self.index.len()
            )));
        }
        for (token, postings) in &self.index {
            if postings.is_empty() {
                return Err(corrupt(format!("token {token:?} has no postings")));
            }
            if postings.len() > self.stats.document_count {
                return Err(corrupt(format!(
                    "token {token:?} has {} postings but num_documents is {}",
                    postings.len(),
                    self.stats.document_count
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = postings.iter().find(|p| !seen.insert(p.document_id.as_str())) {
                return Err(corrupt(format!("token {token:?} has two postings for {}", dup.document_id)));
            }
            for posting in postings {
                if posting.positions.is_empty() {
                    return Err(corrupt(format!(
                        "posting for {token:?} in {} has no positions",
                        posting.document_id
                    )));
                }
                if posting.positions.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(corrupt(format!(
                        "positions for {token:?} in {} are not strictly increasing",
                        posting.document_id
                    )));
                }
                if !posting.frequency.is_finite() || posting.frequency < 0.0 {
                    return Err(corrupt(format!("bad frequency for {token:?} in {}", posting.document_id)));
                }
                if !posting.weight.is_finite() {
                    return Err(corrupt(format!("bad tfidf for {token:?} in {}", posting.document_id)));
                }
            }
        }
        Ok(())
    }
}

fn corrupt(reason: String) -> EngineError {
    EngineError::IndexFileCorrupt(reason)
}

/// Local term frequency, shared by the build side and the query side.
pub fn term_frequency(count: usize, length: usize) -> f64 {
    if length == 0 {
        return 0.0;
    }
    count as f64 / length as f64
}

/// `ln(N / dft)`. Not clamped: a token present in every document gets 0.
pub fn inverse_document_frequency(document_count: usize, document_frequency: usize) -> f64 {
    (document_count as f64 / document_frequency as f64).ln()
}
