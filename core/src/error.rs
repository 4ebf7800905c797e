use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// A single document could not be fetched or parsed. The builder skips it.
    #[error("document {id} unavailable: {reason}")]
    DocumentUnavailable { id: String, reason: String },

    /// The corpus listing is missing or corrupt. Aborts the build.
    #[error("manifest {} unreadable: {reason}", .path.display())]
    ManifestUnreadable { path: PathBuf, reason: String },

    #[error("index file corrupt: {0}")]
    IndexFileCorrupt(String),

    #[error("failed to encode index: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, EngineError>;
