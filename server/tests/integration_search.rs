use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use search_core::persist::{save_index, IndexFormat, IndexPaths};
use search_core::{IndexBuilder, RankingConfig, SourceDocument, TextTokenizer};
use serde_json::Value;
use std::fs;
use tempfile::tempdir;
use tower::ServiceExt;

fn page(id: &str, title: &str, text: &str) -> SourceDocument {
    let mut doc = SourceDocument::plain(id, text);
    doc.url = format!("https://example.com/{id}");
    doc.title = Some(title.to_string());
    doc
}

fn build_tiny_index(dir: &std::path::Path) {
    let store = IndexBuilder::new(TextTokenizer).build(vec![
        page("0/1", "Fox", "the quick brown fox jumps over the dog"),
        page("0/2", "Dog", "a quick brown dog sleeps"),
        page("0/3", "Cats", "cats nap all afternoon"),
    ]);
    save_index(&IndexPaths::new(dir), &store, IndexFormat::Json, "2024-01-01T00:00:00Z".into()).unwrap();
}

fn app(dir: &std::path::Path) -> Router {
    server::build_app(&dir.to_string_lossy(), RankingConfig::default()).unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, json) = get(app(dir.path()), "/search?q=quick%20fox&k=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["document_id"], "0/1");
    assert_eq!(arr[0]["url"], "https://example.com/0/1");
    assert_eq!(arr[1]["document_id"], "0/2");
    assert!(arr[0]["score"].as_f64().unwrap() >= arr[1]["score"].as_f64().unwrap());
}

#[tokio::test]
async fn post_search_matches_get() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let req = Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query": "quick fox"}"#))
        .unwrap();
    let (status, posted) = send(app(dir.path()), req).await;
    assert_eq!(status, StatusCode::OK);
    let (_, fetched) = get(app(dir.path()), "/search?q=quick%20fox").await;
    assert_eq!(posted["results"], fetched["results"]);
}

#[tokio::test]
async fn unmatched_query_has_no_hits() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, json) = get(app(dir.path()), "/search?q=zebra").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn k_is_clamped_to_at_least_one() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (_, json) = get(app(dir.path()), "/search?q=quick&k=0").await;
    assert_eq!(json["total_hits"], 2);
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn queries_are_logged_next_to_the_index() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    get(app(dir.path()), "/search?q=quick").await;
    get(app(dir.path()), "/search?q=zebra").await;
    let log = fs::read_to_string(IndexPaths::new(dir.path()).query_log()).unwrap();
    assert!(log.contains("Query: quick"));
    assert!(log.contains("No results found."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_each_get_one_log_entry() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = app(dir.path());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let app = app.clone();
            let uri = if i % 2 == 0 { "/search?q=quick" } else { "/search?q=zebra" };
            tokio::spawn(async move { get(app, uri).await })
        })
        .collect();
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let log = fs::read_to_string(IndexPaths::new(dir.path()).query_log()).unwrap();
    assert_eq!(log.matches("Query: quick").count(), 4);
    assert_eq!(log.matches("Query: zebra").count(), 4);
}

#[tokio::test]
async fn doc_lookup_by_slash_separated_id() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, json) = get(app(dir.path()), "/doc/0/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Cats");
    assert_eq!(json["url"], "https://example.com/0/3");

    let (status, _) = get(app(dir.path()), "/doc/9/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_stats() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let resp = app(dir.path()).oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, json) = get(app(dir.path()), "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["num_documents"], 3);
    assert_eq!(json["ranking"]["top_k"], 20);
}

#[test]
fn missing_index_fails_to_load() {
    let dir = tempdir().unwrap();
    assert!(server::build_app(&dir.path().to_string_lossy(), RankingConfig::default()).is_err());
}
