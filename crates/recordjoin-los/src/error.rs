//! Error types for the local override storage

use recordjoin_query::DataError;
use thiserror::Error;

/// Errors that can occur while editing or persisting the storage
#[derive(Error, Debug)]
pub enum LosError {
    #[error("Cache file is corrupt: {0}")]
    CacheCorruption(String),

    #[error("Selection error: {0}")]
    Selection(String),

    #[error("Entry \"{0}\" has no background record")]
    NoBackground(String),

    #[error("Override of column \"{0}\" must not be empty, drop it instead")]
    EmptyOverride(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LosError {
    pub fn corruption(msg: impl Into<String>) -> Self {
        LosError::CacheCorruption(msg.into())
    }

    pub fn selection(msg: impl Into<String>) -> Self {
        LosError::Selection(msg.into())
    }

    pub fn is_column_not_found(&self) -> bool {
        matches!(self, LosError::Data(e) if e.is_column_not_found())
    }
}

pub type Result<T> = std::result::Result<T, LosError>;
