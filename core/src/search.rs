use tracing::debug;

use crate::index::IndexStore;
use crate::planner::QueryPlanner;
use crate::ranking::{RankingConfig, RankingEngine, SearchResults};
use crate::tokenizer::{TextTokenizer, Tokenize};

/// Plans and ranks queries against a read-only store.
pub struct SearchEngine<T = TextTokenizer> {
    planner: QueryPlanner<T>,
    ranking: RankingEngine,
}

impl Default for SearchEngine<TextTokenizer> {
    fn default() -> Self {
        Self::new(TextTokenizer, RankingConfig::default())
    }
}

impl<T: Tokenize> SearchEngine<T> {
    pub fn new(tokenizer: T, config: RankingConfig) -> Self {
        Self { planner: QueryPlanner::new(tokenizer), ranking: RankingEngine::new(config) }
    }

    pub fn config(&self) -> &RankingConfig {
        self.ranking.config()
    }

    /// `None` when no document matches any query token.
    pub fn search(&self, query: &str, store: &IndexStore) -> Option<SearchResults> {
        self.search_top(query, store, self.ranking.config().top_k)
    }

    pub fn search_top(&self, query: &str, store: &IndexStore, limit: usize) -> Option<SearchResults> {
        let plan = self.planner.plan(query, store);
        debug!(query, tokens = plan.tokens().len(), candidates = plan.len(), "planned query");
        self.ranking.rank(plan, store, limit)
    }
}
