//! Term-level inverted index with composite TF-IDF / cosine / proximity / markup ranking.
//!
//! Index a corpus once with [`IndexBuilder`], persist it with [`persist`], then answer
//! queries against the read-only [`IndexStore`] with [`SearchEngine`].

pub mod builder;
pub mod document;
pub mod error;
pub mod index;
pub mod persist;
pub mod planner;
pub mod ranking;
pub mod report;
pub mod search;
pub mod similarity;
pub mod tokenizer;

pub use builder::{BuildOptions, IndexBuilder};
pub use document::{DocumentSource, ManifestEntry, PagesDirectory, SourceDocument, TagTree};
pub use error::{EngineError, Result};
pub use index::{CorpusStats, DocMeta, DocumentId, IndexStore, InvertedIndex, Posting};
pub use planner::{QueryPlan, QueryPlanner, SearchCandidate};
pub use ranking::{RankedHit, RankingConfig, RankingEngine, SearchResults, Stage};
pub use search::SearchEngine;
pub use tokenizer::{TextTokenizer, Tokenize};

pub fn build_index(documents: Vec<SourceDocument>) -> IndexStore {
    IndexBuilder::new(TextTokenizer).build(documents)
}

/// Decodes the JSON index schema.
pub fn load_index(bytes: &[u8]) -> Result<IndexStore> {
    persist::from_json(bytes)
}

pub fn save_index(store: &IndexStore) -> Result<Vec<u8>> {
    persist::to_json(store)
}

/// Top 20 hits for `query`, or `None` when nothing matches.
pub fn search(query: &str, store: &IndexStore) -> Option<SearchResults> {
    SearchEngine::default().search(query, store)
}
