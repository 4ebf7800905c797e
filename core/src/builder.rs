use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::document::{DocumentSource, ManifestEntry, SourceDocument};
use crate::error::Result;
use crate::index::{
    inverse_document_frequency, term_frequency, CorpusStats, DocMeta, DocumentId, IndexStore,
    InvertedIndex, Posting,
};
use crate::tokenizer::Tokenize;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Skip manifest entries whose URL carries a `#fragment`; they still count toward the corpus size.
    pub skip_fragment_urls: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { skip_fragment_urls: true }
    }
}

/// Postings of one document, in first-occurrence order of their tokens.
struct AnalyzedDocument {
    id: DocumentId,
    meta: DocMeta,
    postings: Vec<(String, Posting)>,
}

pub struct IndexBuilder<T> {
    tokenizer: T,
    options: BuildOptions,
}

impl<T: Tokenize> IndexBuilder<T> {
    pub fn new(tokenizer: T) -> Self {
        Self { tokenizer, options: BuildOptions::default() }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Index an in-memory corpus. Every supplied document counts toward the corpus
    /// size, including ones that tokenize to nothing. Repeated ids keep the first document.
    pub fn build(&self, documents: Vec<SourceDocument>) -> IndexStore {
        let documents = first_by_id(documents, |doc| doc.id.as_str());
        let document_count = documents.len();

        #[cfg(feature = "parallel")]
        let analyzed: Vec<_> = documents.into_par_iter().map(|doc| self.analyze(doc)).collect();
        #[cfg(not(feature = "parallel"))]
        let analyzed: Vec<_> = documents.into_iter().map(|doc| self.analyze(doc)).collect();

        self.assemble(analyzed.into_iter().flatten(), document_count)
    }

    /// Index every document a source lists. An unreadable manifest aborts the build;
    /// an unavailable document is logged and skipped.
    pub fn build_from_source<S: DocumentSource>(&self, source: &S) -> Result<IndexStore> {
        let manifest = first_by_id(source.manifest()?, |entry| entry.id.as_str());
        let document_count = manifest.len();
        info!(document_count, "read manifest");

        let entries: Vec<&ManifestEntry> = manifest
            .iter()
            .filter(|entry| {
                let skip = self.options.skip_fragment_urls && entry.url.contains('#');
                if skip {
                    debug!(id = %entry.id, url = %entry.url, "skipping fragment url");
                }
                !skip
            })
            .collect();

        #[cfg(feature = "parallel")]
        let analyzed: Vec<_> = entries.par_iter().map(|entry| self.load(source, entry)).collect();
        #[cfg(not(feature = "parallel"))]
        let analyzed: Vec<_> = entries.iter().map(|entry| self.load(source, entry)).collect();

        Ok(self.assemble(analyzed.into_iter().flatten(), document_count))
    }

    fn load<S: DocumentSource>(&self, source: &S, entry: &ManifestEntry) -> Option<AnalyzedDocument> {
        match source.fetch(entry) {
            Ok(doc) => self.analyze(doc),
            Err(err) => {
                warn!(id = %entry.id, error = %err, "skipping document");
                None
            }
        }
    }

    fn analyze(&self, doc: SourceDocument) -> Option<AnalyzedDocument> {
        let tokens = self.tokenizer.tokenize(&doc.text);
        if tokens.is_empty() {
            debug!(id = %doc.id, "document has no tokens");
            return None;
        }

        let mut order: Vec<(&str, Vec<u32>)> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();
        for (offset, token) in tokens.iter().enumerate() {
            let Some(position) = token_position(offset) else {
                warn!(id = %doc.id, tokens = tokens.len(), "document too long to index, skipping");
                return None;
            };
            let slot = *slots.entry(token.as_str()).or_insert_with(|| {
                order.push((token.as_str(), Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(position);
        }

        let postings = order
            .into_iter()
            .map(|(token, positions)| {
                let frequency = term_frequency(positions.len(), tokens.len());
                let important = doc.tags.contains_important(token);
                let posting = Posting::new(doc.id.clone(), frequency, positions, important);
                (token.to_string(), posting)
            })
            .collect();

        Some(AnalyzedDocument {
            id: doc.id,
            meta: DocMeta { url: doc.url, title: doc.title },
            postings,
        })
    }

    fn assemble(&self, documents: impl Iterator<Item = AnalyzedDocument>, document_count: usize) -> IndexStore {
        let mut index = InvertedIndex::new();
        let mut metas: BTreeMap<DocumentId, DocMeta> = BTreeMap::new();
        for doc in documents {
            if metas.contains_key(&doc.id) {
                warn!(id = %doc.id, "duplicate document id, keeping the first");
                continue;
            }
            for (token, posting) in doc.postings {
                index.entry(token).or_insert_with(Vec::new).push(posting);
            }
            metas.insert(doc.id, doc.meta);
        }

        apply_weights(&mut index, document_count);

        let vocabulary = index.keys().cloned().collect();
        info!(
            document_count,
            indexed = metas.len(),
            unique_words = index.len(),
            "index build complete"
        );
        IndexStore::new(index, CorpusStats { document_count, vocabulary }, metas)
    }
}

/// Drops items whose id was already seen, keeping the first occurrence in order.
fn first_by_id<D>(items: Vec<D>, id: impl Fn(&D) -> &str) -> Vec<D> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(id(item).to_string());
            if !fresh {
                warn!(id = id(item), "duplicate document id, keeping the first");
            }
            fresh
        })
        .collect()
}

/// Offsets past `u32::MAX` do not fit a posting.
fn token_position(offset: usize) -> Option<u32> {
    u32::try_from(offset).ok()
}

/// Sets every posting's weight to `tf * ln(N / dft)`, where dft is the length of the
/// token's posting list.
pub fn apply_weights(index: &mut InvertedIndex, document_count: usize) {
    for postings in index.values_mut() {
        let idf = inverse_document_frequency(document_count, postings.len());
        for posting in postings.iter_mut() {
            posting.set_weight(posting.frequency * idf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TagTree;
    use crate::error::EngineError;
    use crate::tokenizer::TextTokenizer;

    fn builder() -> IndexBuilder<TextTokenizer> {
        IndexBuilder::new(TextTokenizer)
    }

    #[test]
    fn records_positions_and_frequency() {
        let store = builder().build(vec![SourceDocument::plain("d1", "rust fox rust dog")]);
        let rust = &store.postings("rust").unwrap()[0];
        assert_eq!(rust.positions, vec![0, 2]);
        assert_eq!(rust.frequency, 0.5);
        assert_eq!(rust.occurrences(), 2);
    }

    #[test]
    fn postings_trace_back_to_token_positions() {
        let docs = vec![
            SourceDocument::plain("d1", "the quick brown fox jumps over the quick dog"),
            SourceDocument::plain("d2", "the slow fox"),
        ];
        let texts: HashMap<_, _> = docs.iter().map(|d| (d.id.clone(), d.text.clone())).collect();
        let store = builder().build(docs);

        for (token, postings) in store.index() {
            assert!(!postings.is_empty());
            for posting in postings {
                let tokens = TextTokenizer.tokenize(&texts[&posting.document_id]);
                for &pos in &posting.positions {
                    assert_eq!(&tokens[pos as usize], token);
                }
            }
        }
    }

    #[test]
    fn empty_documents_are_skipped_but_counted() {
        let store = builder().build(vec![
            SourceDocument::plain("d1", "rust"),
            SourceDocument::plain("d2", "the and of"),
        ]);
        assert_eq!(store.document_count(), 2);
        assert!(store.document("d2").is_none());
        let rust = &store.postings("rust").unwrap()[0];
        assert!((rust.weight - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn weights_follow_idf_of_posting_list_length() {
        let store = builder().build(vec![
            SourceDocument::plain("d1", "rust cat"),
            SourceDocument::plain("d2", "rust dog"),
            SourceDocument::plain("d3", "fox"),
        ]);
        for (token, postings) in store.index() {
            let idf = (3.0 / postings.len() as f64).ln();
            assert_eq!(store.idf(token), Some(idf));
            for posting in postings {
                assert!((posting.weight - posting.frequency * idf).abs() < 1e-12);
            }
        }
        assert_eq!(store.vocabulary().len(), store.len());
    }

    #[test]
    fn marks_tokens_found_in_important_tags() {
        let doc = SourceDocument::plain("d1", "rust ownership rules")
            .with_tags(TagTree::new().with_element("h1", "Rust"));
        let store = builder().build(vec![doc]);
        assert!(store.postings("rust").unwrap()[0].important);
        assert!(!store.postings("rule").unwrap()[0].important);
    }

    #[test]
    fn duplicate_ids_keep_the_first_document() {
        let store = builder().build(vec![
            SourceDocument::plain("d1", "rust fox"),
            SourceDocument::plain("d1", "rust dog"),
            SourceDocument::plain("d2", "cat"),
        ]);
        assert_eq!(store.document_count(), 2);
        let rust: Vec<_> = store.postings("rust").unwrap().iter().map(|p| p.document_id.as_str()).collect();
        assert_eq!(rust, vec!["d1"]);
        assert!(store.postings("dog").is_none());
        assert!((store.idf("rust").unwrap() - 2f64.ln()).abs() < 1e-12);
        assert!(store.validate().is_ok());
    }

    #[test]
    fn duplicate_manifest_entries_are_indexed_once() {
        let source = FlakySource { entries: vec![entry("ok", "https://a"), entry("ok", "https://a")] };
        let store = builder().build_from_source(&source).unwrap();
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.document_frequency("rust"), 1);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn offsets_beyond_u32_have_no_position() {
        assert_eq!(token_position(7), Some(7));
        assert_eq!(token_position(u32::MAX as usize), Some(u32::MAX));
        assert_eq!(token_position(u32::MAX as usize + 1), None);
    }

    struct FlakySource {
        entries: Vec<ManifestEntry>,
    }

    impl DocumentSource for FlakySource {
        fn manifest(&self) -> Result<Vec<ManifestEntry>> {
            Ok(self.entries.clone())
        }

        fn fetch(&self, entry: &ManifestEntry) -> Result<SourceDocument> {
            if entry.id == "broken" {
                return Err(EngineError::DocumentUnavailable { id: entry.id.clone(), reason: "gone".into() });
            }
            Ok(SourceDocument::plain(&entry.id, "rust fox"))
        }
    }

    fn entry(id: &str, url: &str) -> ManifestEntry {
        ManifestEntry { id: id.into(), url: url.into() }
    }

    #[test]
    fn unavailable_documents_do_not_abort_the_build() {
        let source = FlakySource {
            entries: vec![
                entry("ok", "https://a"),
                entry("broken", "https://b"),
                entry("frag", "https://a#top"),
            ],
        };
        let store = builder().build_from_source(&source).unwrap();
        assert_eq!(store.document_count(), 3);
        assert_eq!(store.document_frequency("rust"), 1);
        assert!(store.document("frag").is_none());

        let keep = builder().with_options(BuildOptions { skip_fragment_urls: false });
        assert_eq!(keep.build_from_source(&source).unwrap().document_frequency("rust"), 2);
    }

    struct NoManifest;

    impl DocumentSource for NoManifest {
        fn manifest(&self) -> Result<Vec<ManifestEntry>> {
            Err(EngineError::ManifestUnreadable { path: "bookkeeping.json".into(), reason: "missing".into() })
        }

        fn fetch(&self, _entry: &ManifestEntry) -> Result<SourceDocument> {
            unreachable!()
        }
    }

    #[test]
    fn unreadable_manifest_aborts() {
        let err = builder().build_from_source(&NoManifest).unwrap_err();
        assert!(matches!(err, EngineError::ManifestUnreadable { .. }));
    }
}
