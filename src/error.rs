use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("artifact serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("support path does not exist or is not a directory: {0}")]
    InvalidSupportPath(PathBuf),

    #[error("unsupported file type: {0}")]
    UnsupportedFile(PathBuf),

    #[error("unreadable document {path}: {reason}")]
    UnreadableDocument { path: PathBuf, reason: String },

    #[error("failed to commit index changes: {0}")]
    CommitFailed(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("query cancelled")]
    Cancelled,
}
