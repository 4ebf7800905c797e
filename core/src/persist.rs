use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{create_dir_all, rename, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::index::{CorpusStats, DocMeta, DocumentId, IndexStore, InvertedIndex};

const TEMP_FILE_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    #[default]
    Json,
    Bincode,
}

impl IndexFormat {
    fn file_name(self) -> &'static str {
        match self {
            Self::Json => "index.json",
            Self::Bincode => "index.bin",
        }
    }
}

impl FromStr for IndexFormat {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "bincode" | "bin" => Ok(Self::Bincode),
            other => Err(format!("unknown index format {other:?} (expected json or bincode)")),
        }
    }
}

impl fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Bincode => "bincode",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub unique_words: usize,
    pub created_at: String,
    pub version: u32,
    pub format: IndexFormat,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn index(&self, format: IndexFormat) -> PathBuf { self.root.join(format.file_name()) }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn analytics(&self) -> PathBuf { self.root.join("analytics.txt") }
    pub fn query_log(&self) -> PathBuf { self.root.join("queries.log") }
}

/// `unique_words` is written as the token list; older files carry only the count.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum UniqueWords {
    Count(usize),
    Tokens(Vec<String>),
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    unique_words: Vec<&'a str>,
    num_documents: usize,
    inverted_index: &'a InvertedIndex,
    documents: &'a BTreeMap<DocumentId, DocMeta>,
}

#[derive(Deserialize)]
struct IndexFile {
    unique_words: UniqueWords,
    num_documents: usize,
    inverted_index: InvertedIndex,
    #[serde(default)]
    documents: BTreeMap<DocumentId, DocMeta>,
}

impl IndexFile {
    fn into_store(self) -> Result<IndexStore> {
        let vocabulary = match self.unique_words {
            UniqueWords::Tokens(tokens) => tokens.into_iter().collect(),
            UniqueWords::Count(count) => {
                if count != self.inverted_index.len() {
                    return Err(EngineError::IndexFileCorrupt(format!(
                        "unique_words is {count} but the index has {} tokens",
                        self.inverted_index.len()
                    )));
                }
                self.inverted_index.keys().cloned().collect()
            }
        };
        let stats = CorpusStats { document_count: self.num_documents, vocabulary };
        Ok(IndexStore::new(self.inverted_index, stats, self.documents))
    }
}

pub fn to_json(store: &IndexStore) -> Result<Vec<u8>> {
    let file = IndexFileRef {
        unique_words: store.vocabulary().iter().map(String::as_str).collect(),
        num_documents: store.document_count(),
        inverted_index: store.index(),
        documents: store.documents(),
    };
    serde_json::to_vec(&file).map_err(|e| EngineError::Encode(e.to_string()))
}

pub fn from_json(bytes: &[u8]) -> Result<IndexStore> {
    let file: IndexFile =
        serde_json::from_slice(bytes).map_err(|e| EngineError::IndexFileCorrupt(e.to_string()))?;
    let store = file.into_store()?;
    store.validate()?;
    Ok(store)
}

pub fn encode(store: &IndexStore, format: IndexFormat) -> Result<Vec<u8>> {
    match format {
        IndexFormat::Json => to_json(store),
        IndexFormat::Bincode => bincode::serialize(store).map_err(|e| EngineError::Encode(e.to_string())),
    }
}

pub fn decode(bytes: &[u8], format: IndexFormat) -> Result<IndexStore> {
    match format {
        IndexFormat::Json => from_json(bytes),
        IndexFormat::Bincode => {
            let store: IndexStore =
                bincode::deserialize(bytes).map_err(|e| EngineError::IndexFileCorrupt(e.to_string()))?;
            store.validate()?;
            Ok(store)
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = path.with_extension(TEMP_FILE_SUFFIX);
    let mut f = File::create(&temp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    rename(temp, path)?;
    Ok(())
}

/// Writes the index file and `meta.json`; returns the meta that was written.
pub fn save_index(paths: &IndexPaths, store: &IndexStore, format: IndexFormat, created_at: String) -> Result<MetaFile> {
    create_dir_all(&paths.root)?;
    let bytes = encode(store, format)?;
    write_atomic(&paths.index(format), &bytes)?;

    let meta = MetaFile {
        num_docs: store.document_count(),
        unique_words: store.vocabulary().len(),
        created_at,
        version: 1,
        format,
    };
    save_meta(paths, &meta)?;
    info!(root = %paths.root.display(), %format, bytes = bytes.len(), "saved index");
    Ok(meta)
}

/// Loads the index named by `meta.json`.
pub fn load_index(paths: &IndexPaths) -> Result<IndexStore> {
    let meta = load_meta(paths)?;
    let mut f = File::open(paths.index(meta.format))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let store = decode(&buf, meta.format)?;
    if store.document_count() != meta.num_docs {
        return Err(EngineError::IndexFileCorrupt(format!(
            "meta.json records {} documents but the index has {}",
            meta.num_docs,
            store.document_count()
        )));
    }
    info!(
        root = %paths.root.display(),
        documents = store.document_count(),
        unique_words = store.len(),
        "loaded index"
    );
    Ok(store)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta).map_err(|e| EngineError::Encode(e.to_string()))?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    serde_json::from_str(&buf).map_err(|e| EngineError::IndexFileCorrupt(format!("meta.json: {e}")))
}
