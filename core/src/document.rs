//! Document extraction: turning stored HTML pages into plain text plus the
//! markup regions that mark a token as important.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::index::DocumentId;

/// Markup regions whose text marks a token as important.
pub const IMPORTANT_TAGS: [&str; 8] = ["title", "h1", "h2", "h3", "h4", "h5", "h6", "b"];

pub const DEFAULT_MANIFEST: &str = "bookkeeping.json";

/// Text of the important elements of a document, keyed by tag name. Stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagTree {
    elements: BTreeMap<String, Vec<String>>,
}

impl TagTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, tag: &str, text: &str) -> Self {
        self.push(tag, text);
        self
    }

    pub fn push(&mut self, tag: &str, text: &str) {
        self.elements
            .entry(tag.to_lowercase())
            .or_default()
            .push(text.to_lowercase());
    }

    pub fn texts<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.elements
            .get(tag)
            .into_iter()
            .flat_map(|texts| texts.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn from_html(document: &Html) -> Self {
        let mut tree = Self::new();
        for tag in IMPORTANT_TAGS {
            let Ok(selector) = Selector::parse(tag) else { continue };
            for element in document.select(&selector) {
                let text = element.text().collect::<Vec<_>>().join(" ");
                if !text.trim().is_empty() {
                    tree.push(tag, &text);
                }
            }
        }
        tree
    }

    /// True if any title/h1..h6/b element contains `token` as a case-insensitive substring.
    pub fn contains_important(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        IMPORTANT_TAGS
            .iter()
            .any(|tag| self.texts(tag).any(|text| text.contains(&token)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Location of the page relative to the corpus root; doubles as the document id.
    pub id: DocumentId,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub tags: TagTree,
}

impl SourceDocument {
    /// A plain-text document without markup, mostly useful for tests and ad-hoc corpora.
    pub fn plain(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            url: id.to_string(),
            title: None,
            text: text.to_string(),
            tags: TagTree::new(),
        }
    }

    pub fn with_tags(mut self, tags: TagTree) -> Self {
        self.tags = tags;
        self
    }
}

/// Where the builder gets its corpus from.
pub trait DocumentSource: Sync {
    /// The full corpus listing. Failure here aborts a build.
    fn manifest(&self) -> Result<Vec<ManifestEntry>>;

    /// A single document. Failure here skips the document.
    fn fetch(&self, entry: &ManifestEntry) -> Result<SourceDocument>;
}

pub fn extract_html(entry: &ManifestEntry, html: &str) -> SourceDocument {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .find(|title| !title.is_empty())
    });

    SourceDocument {
        id: entry.id.clone(),
        url: entry.url.clone(),
        title,
        text,
        tags: TagTree::from_html(&document),
    }
}

/// HTML pages stored under a root directory, listed by a `{"<loc>": "<url>"}` manifest.
#[derive(Debug, Clone)]
pub struct PagesDirectory {
    root: PathBuf,
    manifest: PathBuf,
}

impl PagesDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let manifest = root.join(DEFAULT_MANIFEST);
        Self { root, manifest }
    }

    pub fn with_manifest<P: AsRef<Path>>(mut self, manifest: P) -> Self {
        let manifest = manifest.as_ref();
        self.manifest = if manifest.is_absolute() { manifest.to_path_buf() } else { self.root.join(manifest) };
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unreadable(&self, path: &Path, reason: impl ToString) -> EngineError {
        EngineError::ManifestUnreadable { path: path.to_path_buf(), reason: reason.to_string() }
    }

    fn read_manifest(&self) -> Result<Vec<ManifestEntry>> {
        let bytes = fs::read(&self.manifest).map_err(|e| self.unreadable(&self.manifest, e))?;
        let urls: BTreeMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|e| self.unreadable(&self.manifest, e))?;
        Ok(urls.into_iter().map(|(id, url)| ManifestEntry { id, url }).collect())
    }

    fn walk(&self) -> Result<Vec<ManifestEntry>> {
        if !self.root.is_dir() {
            return Err(self.unreadable(&self.root, "corpus root is not a directory"));
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| self.unreadable(&self.root, e))?;
            let path = entry.path();
            let is_html = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| matches!(ext, "html" | "htm"));
            if !entry.file_type().is_file() || !is_html {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else { continue };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(ManifestEntry { url: id.clone(), id });
        }
        Ok(entries)
    }
}

impl DocumentSource for PagesDirectory {
    fn manifest(&self) -> Result<Vec<ManifestEntry>> {
        if self.manifest.exists() {
            self.read_manifest()
        } else {
            self.walk()
        }
    }

    fn fetch(&self, entry: &ManifestEntry) -> Result<SourceDocument> {
        let path = self.root.join(&entry.id);
        let bytes = fs::read(&path).map_err(|e| EngineError::DocumentUnavailable {
            id: entry.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(extract_html(entry, &String::from_utf8_lossy(&bytes)))
    }
}
