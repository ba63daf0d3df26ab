use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChronicleError>;

#[derive(Error, Debug)]
pub enum ChronicleError {
    #[error("Post store {path} is corrupt: {source}")]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("A post with id {0} already exists")]
    DuplicateId(String),

    #[error("Invalid post id [{0}]: only letters, digits, '-', '_' and '.' are allowed")]
    InvalidId(String),

    #[error("Error rendering post {id}: {reason}")]
    Render { id: String, reason: String },

    #[error("Error syncing {path}: {source}")]
    SyncIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Page sync finished with {0} failure(s)")]
    SyncIncomplete(usize),

    #[error("Could not find the latest-post-container placeholder in {0}")]
    PlaceholderMissing(PathBuf),

    #[error("Error parsing template: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ChronicleError {
    pub(crate) fn sync_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ChronicleError::SyncIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn render(id: &str, reason: impl Into<String>) -> Self {
        ChronicleError::Render {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
