use search_core::persist::{decode, encode, load_index, save_index, IndexFormat, IndexPaths};
use search_core::{build_index, load_index as load_bytes, save_index as save_bytes};
use search_core::{CorpusStats, EngineError, IndexStore, SourceDocument, TagTree};
use std::fs;
use tempfile::tempdir;

fn sample_store() -> IndexStore {
    build_index(vec![
        SourceDocument::plain("0/1", "rust ownership and borrowing rust")
            .with_tags(TagTree::new().with_element("title", "Rust")),
        SourceDocument::plain("0/2", "borrowing a fox"),
        SourceDocument::plain("0/3", ""),
    ])
}

fn assert_same(a: &IndexStore, b: &IndexStore) {
    assert_eq!(a.document_count(), b.document_count());
    assert_eq!(a.vocabulary(), b.vocabulary());
    assert_eq!(a.documents(), b.documents());
    assert_eq!(a.len(), b.len());
    for (token, postings) in a.index() {
        let other = b.postings(token).unwrap();
        assert_eq!(postings.len(), other.len());
        for (x, y) in postings.iter().zip(other) {
            assert_eq!(x.document_id, y.document_id);
            assert_eq!(x.positions, y.positions);
            assert_eq!(x.important, y.important);
            assert!((x.frequency - y.frequency).abs() < 1e-12);
            assert!((x.weight - y.weight).abs() < 1e-12);
        }
    }
}

#[test]
fn json_round_trip() {
    let store = sample_store();
    let bytes = save_bytes(&store).unwrap();
    assert_same(&store, &load_bytes(&bytes).unwrap());
}

#[test]
fn bincode_round_trip() {
    let store = sample_store();
    let bytes = encode(&store, IndexFormat::Bincode).unwrap();
    assert_same(&store, &decode(&bytes, IndexFormat::Bincode).unwrap());
}

#[test]
fn json_uses_the_index_file_schema() {
    let bytes = save_bytes(&sample_store()).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["num_documents"], 3);
    assert!(json["unique_words"].is_array());
    let posting = &json["inverted_index"]["rust"][0];
    assert_eq!(posting["document_id"], "0/1");
    assert_eq!(posting["idx_list"], serde_json::json!([0, 3]));
    assert_eq!(posting["tag_important"], true);
    assert!(posting["tfidf"].is_number());
}

#[test]
fn accepts_count_form_and_loc_alias() {
    let raw = r#"{
        "unique_words": 1,
        "num_documents": 2,
        "inverted_index": {
            "fox": [{"loc": "0/2", "frequency": 0.5, "idx_list": [1], "tag_important": false, "tfidf": 0.35}]
        }
    }"#;
    let store = load_bytes(raw.as_bytes()).unwrap();
    assert_eq!(store.postings("fox").unwrap()[0].document_id, "0/2");
    assert!(store.vocabulary().contains("fox"));
}

#[test]
fn rejects_corrupt_files() {
    let cases = [
        "not json",
        r#"{"unique_words": 5, "num_documents": 1, "inverted_index": {"fox": [{"document_id": "a", "frequency": 1.0, "idx_list": [0], "tag_important": false, "tfidf": 0.0}]}}"#,
        r#"{"unique_words": [], "num_documents": 1, "inverted_index": {"fox": []}}"#,
        r#"{"unique_words": [], "num_documents": 1, "inverted_index": {"fox": [{"document_id": "a", "frequency": 1.0, "idx_list": [], "tag_important": false, "tfidf": 0.0}]}}"#,
        r#"{"unique_words": ["zebra"], "num_documents": 1, "inverted_index": {"fox": [{"document_id": "a", "frequency": 1.0, "idx_list": [0], "tag_important": false, "tfidf": 0.0}]}}"#,
        r#"{"unique_words": ["fox"], "num_documents": 1, "inverted_index": {"fox": [
            {"document_id": "a", "frequency": 1.0, "idx_list": [0], "tag_important": false, "tfidf": 0.0},
            {"document_id": "b", "frequency": 1.0, "idx_list": [0], "tag_important": false, "tfidf": 0.0}]}}"#,
    ];
    for raw in cases {
        assert!(matches!(load_bytes(raw.as_bytes()), Err(EngineError::IndexFileCorrupt(_))), "{raw}");
    }
}

#[test]
fn bincode_load_checks_consistency_too() {
    let store = sample_store();
    let forged = IndexStore::new(
        store.index().clone(),
        CorpusStats { document_count: 1, vocabulary: store.vocabulary().clone() },
        store.documents().clone(),
    );
    let bytes = encode(&forged, IndexFormat::Bincode).unwrap();
    assert!(matches!(decode(&bytes, IndexFormat::Bincode), Err(EngineError::IndexFileCorrupt(_))));
}

#[test]
fn save_and_load_directory() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let store = sample_store();

    for format in [IndexFormat::Json, IndexFormat::Bincode] {
        let meta = save_index(&paths, &store, format, "2024-01-01T00:00:00Z".into()).unwrap();
        assert_eq!(meta.num_docs, 3);
        assert_eq!(meta.format, format);
        assert_same(&store, &load_index(&paths).unwrap());
    }
}

#[test]
fn truncated_index_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    save_index(&paths, &sample_store(), IndexFormat::Json, String::new()).unwrap();
    fs::write(paths.index(IndexFormat::Json), b"{\"unique_words\": [").unwrap();
    assert!(matches!(load_index(&paths), Err(EngineError::IndexFileCorrupt(_))));
}
