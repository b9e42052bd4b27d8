use std::path::PathBuf;
use thiserror::Error;

/// Errors from the JSON file record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt collection file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to encode collection: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Field '{0}' is managed by the store and cannot be set")]
    ReservedField(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
