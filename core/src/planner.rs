use std::collections::{BTreeMap, HashMap};

use crate::index::{IndexStore, Posting};
use crate::tokenizer::Tokenize;

/// A document matched by at least one query token during a single query.
/// Borrows its postings from the store; only the score is query-scoped state.
#[derive(Debug, Clone)]
pub struct SearchCandidate<'a> {
    document_id: &'a str,
    postings: BTreeMap<&'a str, &'a Posting>,
    score: f64,
}

impl<'a> SearchCandidate<'a> {
    fn new(document_id: &'a str) -> Self {
        Self { document_id, postings: BTreeMap::new(), score: 1.0 }
    }

    fn insert(&mut self, token: &'a str, posting: &'a Posting) {
        self.postings.insert(token, posting);
    }

    pub fn document_id(&self) -> &'a str {
        self.document_id
    }

    pub fn posting(&self, token: &str) -> Option<&'a Posting> {
        self.postings.get(token).copied()
    }

    /// Matched tokens and their postings for this document.
    pub fn postings(&self) -> impl Iterator<Item = (&'a str, &'a Posting)> + '_ {
        self.postings.iter().map(|(token, posting)| (*token, *posting))
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Scores combine multiplicatively across ranking stages.
    pub fn update_score(&mut self, factor: f64) {
        self.score *= factor;
    }
}

/// Candidates for one query, in discovery order.
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    tokens: Vec<String>,
    candidates: Vec<SearchCandidate<'a>>,
    slots: HashMap<&'a str, usize>,
}

impl<'a> QueryPlan<'a> {
    /// The tokenized query, duplicates and unknown tokens included.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn candidates(&self) -> &[SearchCandidate<'a>] {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut [SearchCandidate<'a>] {
        &mut self.candidates
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<SearchCandidate<'a>>) {
        (self.tokens, self.candidates)
    }

    pub fn get(&self, document_id: &str) -> Option<&SearchCandidate<'a>> {
        self.slots.get(document_id).map(|&slot| &self.candidates[slot])
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// No query token is in the index, or the query tokenized to nothing.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub struct QueryPlanner<T> {
    tokenizer: T,
}

impl<T: Tokenize> QueryPlanner<T> {
    pub fn new(tokenizer: T) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Gathers every document matching at least one query token (OR semantics).
    pub fn plan<'a>(&self, query: &str, store: &'a IndexStore) -> QueryPlan<'a> {
        let tokens = self.tokenizer.tokenize(query);
        let mut candidates: Vec<SearchCandidate<'a>> = Vec::new();
        let mut slots: HashMap<&'a str, usize> = HashMap::new();

        for token in &tokens {
            let Some((key, postings)) = store.index().get_key_value(token.as_str()) else {
                continue;
            };
            for posting in postings {
                let slot = *slots.entry(posting.document_id.as_str()).or_insert_with(|| {
                    candidates.push(SearchCandidate::new(&posting.document_id));
                    candidates.len() - 1
                });
                candidates[slot].insert(key, posting);
            }
        }

        QueryPlan { tokens, candidates, slots }
    }
}
