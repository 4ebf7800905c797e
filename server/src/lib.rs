use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use parking_lot::Mutex;
use search_core::persist::{load_index, IndexPaths};
use search_core::report::format_response;
use search_core::{IndexStore, RankedHit, RankingConfig, SearchEngine, TextTokenizer};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<RankedHit>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub num_documents: usize,
    pub unique_words: usize,
    pub ranking: RankingConfig,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<IndexStore>,
    pub engine: Arc<SearchEngine<TextTokenizer>>,
    /// Answered queries are appended here when set. Opened once in append mode.
    pub query_log: Option<Arc<Mutex<File>>>,
}

/// Loads the index under `index_dir` and serves it; queries are logged next to it.
pub fn build_app(index_dir: &str, config: RankingConfig) -> Result<Router> {
    let paths = IndexPaths::new(index_dir);
    let store = load_index(&paths)?;
    let log = OpenOptions::new().create(true).append(true).open(paths.query_log())?;
    let state = AppState {
        store: Arc::new(store),
        engine: Arc::new(SearchEngine::new(TextTokenizer, config)),
        query_log: Some(Arc::new(Mutex::new(log))),
    };
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler).post(search_post_handler))
        .route("/stats", get(stats_handler))
        .route("/doc/*doc_id", get(doc_handler))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

// CORS_ALLOW_ORIGIN is a comma-separated origin list; Any when unset or unparsable.
fn cors_layer() -> CorsLayer {
    let origins: Vec<_> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    Json(run_search(&state, params.q, params.k).await)
}

pub async fn search_post_handler(State(state): State<AppState>, Json(request): Json<SearchRequest>) -> Json<SearchResponse> {
    Json(run_search(&state, request.query, request.k).await)
}

async fn run_search(state: &AppState, query: String, k: Option<usize>) -> SearchResponse {
    let start = std::time::Instant::now();
    let k = k.unwrap_or(state.engine.config().top_k).clamp(1, MAX_K);
    let results = state.engine.search_top(&query, &state.store, k);

    if let Some(log) = state.query_log.clone() {
        let entry = format_response(&query, results.as_ref());
        let written = tokio::task::spawn_blocking(move || writeln!(log.lock(), "{entry}")).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "could not append to query log"),
            Err(err) => tracing::warn!(error = %err, "query log writer failed"),
        }
    }

    let (total_hits, results) = match results {
        Some(results) => (results.total, results.hits),
        None => (0, Vec::new()),
    };
    SearchResponse { query, took_s: start.elapsed().as_secs_f64(), total_hits, results }
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        num_documents: state.store.document_count(),
        unique_words: state.store.vocabulary().len(),
        ranking: state.engine.config().clone(),
    })
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.store.document(&doc_id) {
        Some(meta) => Ok(Json(serde_json::json!({
            "document_id": doc_id,
            "url": meta.url,
            "title": meta.title,
        }))),
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })))),
    }
}
