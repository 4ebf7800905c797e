use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::index::IndexStore;
use crate::ranking::SearchResults;

/// Index Analytics Table: vocabulary size, corpus size, index file size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analytics {
    pub unique_words: usize,
    pub documents: usize,
    pub index_bytes: u64,
}

impl Analytics {
    pub fn collect(store: &IndexStore, index_file: &Path) -> Result<Self> {
        Ok(Self {
            unique_words: store.vocabulary().len(),
            documents: store.document_count(),
            index_bytes: fs::metadata(index_file)?.len(),
        })
    }
}

impl fmt::Display for Analytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index Analytics Table:")?;
        writeln!(f, "\tNumber of unique words: {}", self.unique_words)?;
        writeln!(f, "\tNumber of documents: {}", self.documents)?;
        writeln!(f, "\tIndex file size: {}KB", self.index_bytes / 1000)
    }
}

pub fn format_response(query: &str, results: Option<&SearchResults>) -> String {
    let Some(results) = results else {
        return format!("Query: {query}\nNumber of Results: 0\nNo results found.\n");
    };

    let mut out = format!(
        "Query: {query}\nNumber of Results: {}\nTop Results (up to {}):\n",
        results.total,
        results.hits.len()
    );
    for (rank, hit) in results.hits.iter().enumerate() {
        let title = hit.title.as_deref().unwrap_or("(untitled)");
        let url = hit.url.as_deref().unwrap_or(&hit.document_id);
        out.push_str(&format!("\tRESULT {}: {:.4}, {title}, {url}\n", rank + 1, hit.score));
    }
    out
}

/// Appends a formatted response to the query log, creating it if needed.
pub fn append_response(log: &Path, query: &str, results: Option<&SearchResults>) -> Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(log)?;
    writeln!(f, "{}", format_response(query, results))?;
    Ok(())
}
