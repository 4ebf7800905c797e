//! Multi-signal ranking over a query's candidates.
//!
//! Each stage computes a raw score per candidate, maps it into `[1, 2]` and
//! multiplies it into the candidate's running score:
//!
//! | Stage     | Raw score                                   | Normalization              |
//! |-----------|---------------------------------------------|----------------------------|
//! | Cosine    | cos(query tf-idf vector, document vector)   | min-max over candidates    |
//! | TfIdf     | sum of matched posting weights              | min-max over candidates    |
//! | Proximity | `5 - 4 / (adjacent_pairs + 1)`              | fixed range `[1, 5]`       |
//! | Tags      | `1 + 0.5` per important matched posting     | none, multiplied directly  |
//!
//! Because the stages combine multiplicatively the final order does not depend
//! on stage order; only the debug bookkeeping does.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::index::{term_frequency, DocumentId, IndexStore};
use crate::planner::{QueryPlan, SearchCandidate};
use crate::similarity::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cosine,
    TfIdf,
    Proximity,
    Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub stages: Vec<Stage>,
    pub top_k: usize,
    pub proximity_floor: f64,
    pub proximity_ceiling: f64,
    pub tag_bonus: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            stages: vec![Stage::Cosine, Stage::TfIdf, Stage::Proximity, Stage::Tags],
            top_k: 20,
            proximity_floor: 1.0,
            proximity_ceiling: 5.0,
            tag_bonus: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub document_id: DocumentId,
    pub url: Option<String>,
    pub title: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Number of candidates matched, before truncation.
    pub total: usize,
    pub hits: Vec<RankedHit>,
}

/// `1` when every raw score is equal, else `1 + (score - min) / (max - min)`.
pub fn normalize(score: f64, minimum: f64, maximum: f64) -> f64 {
    if maximum == minimum {
        return 1.0;
    }
    1.0 + (score - minimum) / (maximum - minimum)
}

/// Proximity raw score: 1 at zero hits, increasing toward 5.
pub fn adjacency_coefficient(adjacent_pairs: usize) -> f64 {
    -1.0 / ((adjacent_pairs as f64 + 1.0) / 4.0) + 5.0
}

/// Merge-walks two sorted position lists, counting pairs that sit one token apart.
/// A matched pair consumes both positions.
pub fn count_adjacent(a: &[u32], b: &[u32]) -> usize {
    let (mut i, mut j) = (0, 0);
    let mut pairs = 0;
    while i < a.len() && j < b.len() {
        if a[i].abs_diff(b[j]) == 1 {
            pairs += 1;
            i += 1;
            j += 1;
        } else if a[i] < b[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Scores and sorts the plan's candidates, keeping at most `limit` hits (at least one).
    /// `None` when the plan has no candidates.
    pub fn rank(&self, plan: QueryPlan<'_>, store: &IndexStore, limit: usize) -> Option<SearchResults> {
        if plan.is_empty() {
            return None;
        }
        let limit = limit.max(1);
        let (tokens, mut candidates) = plan.into_parts();

        for stage in &self.config.stages {
            match stage {
                Stage::Cosine => self.score_cosine(&tokens, &mut candidates, store),
                Stage::TfIdf => self.score_tfidf(&mut candidates),
                Stage::Proximity => self.score_proximity(&tokens, &mut candidates),
                Stage::Tags => self.score_tags(&mut candidates),
            }
        }

        // Stable: ties keep discovery order.
        candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));

        let total = candidates.len();
        let hits = candidates
            .iter()
            .take(limit)
            .map(|candidate| {
                let meta = store.document(candidate.document_id());
                RankedHit {
                    document_id: candidate.document_id().to_string(),
                    url: meta.map(|m| m.url.clone()),
                    title: meta.and_then(|m| m.title.clone()),
                    score: candidate.score(),
                }
            })
            .collect();
        Some(SearchResults { total, hits })
    }

    fn score_cosine(&self, tokens: &[String], candidates: &mut [SearchCandidate<'_>], store: &IndexStore) {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();
        for token in tokens {
            let slot = *slots.entry(token.as_str()).or_insert_with(|| {
                counts.push((token.as_str(), 0));
                counts.len() - 1
            });
            counts[slot].1 += 1;
        }

        // Dimensions for query tokens absent from the index are dropped from both vectors.
        let dimensions: Vec<(&str, f64)> = counts
            .into_iter()
            .filter_map(|(token, count)| store.idf(token).map(|idf| (token, term_frequency(count, tokens.len()) * idf)))
            .collect();
        let query_vector: Vec<f64> = dimensions.iter().map(|(_, weight)| *weight).collect();

        let raw: Vec<f64> = candidates
            .iter()
            .map(|candidate| {
                let document_vector: Vec<f64> = dimensions
                    .iter()
                    .map(|(token, _)| match (candidate.posting(token), store.idf(token)) {
                        (Some(posting), Some(idf)) => posting.frequency * idf,
                        _ => 0.0,
                    })
                    .collect();
                cosine_similarity(&query_vector, &document_vector)
            })
            .collect();
        apply_min_max("cosine", candidates, &raw);
    }

    fn score_tfidf(&self, candidates: &mut [SearchCandidate<'_>]) {
        let raw: Vec<f64> = candidates
            .iter()
            .map(|candidate| candidate.postings().map(|(_, posting)| posting.weight).sum::<f64>())
            .collect();
        apply_min_max("tfidf", candidates, &raw);
    }

    fn score_proximity(&self, tokens: &[String], candidates: &mut [SearchCandidate<'_>]) {
        let (floor, ceiling) = (self.config.proximity_floor, self.config.proximity_ceiling);
        for candidate in candidates.iter_mut() {
            let adjacent_pairs: usize = tokens
                .windows(2)
                .filter_map(|pair| Some((candidate.posting(&pair[0])?, candidate.posting(&pair[1])?)))
                .map(|(first, second)| count_adjacent(&first.positions, &second.positions))
                .sum();
            let raw = adjacency_coefficient(adjacent_pairs);
            debug!(stage = "proximity", document = candidate.document_id(), adjacent_pairs, raw);
            candidate.update_score(normalize(raw, floor, ceiling));
        }
    }

    fn score_tags(&self, candidates: &mut [SearchCandidate<'_>]) {
        for candidate in candidates.iter_mut() {
            let important = candidate.postings().filter(|(_, posting)| posting.important).count();
            candidate.update_score(1.0 + self.config.tag_bonus * important as f64);
        }
    }
}

fn apply_min_max(stage: &str, candidates: &mut [SearchCandidate<'_>], raw: &[f64]) {
    let minimum = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let maximum = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    debug!(stage, minimum, maximum, candidates = raw.len(), "raw score range");
    for (candidate, score) in candidates.iter_mut().zip(raw) {
        candidate.update_score(normalize(*score, minimum, maximum));
    }
}
