use recordjoin_los::LosError;
use recordjoin_query::DataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoinerError {
    /// Reading the current entry while the storage has no selection
    #[error("No entry is selected")]
    NothingSelected,

    #[error("Selection error: {0}")]
    Selection(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Storage(#[from] LosError),
}

impl JoinerError {
    pub fn selection(msg: impl Into<String>) -> Self {
        JoinerError::Selection(msg.into())
    }

    pub fn is_column_not_found(&self) -> bool {
        match self {
            JoinerError::Data(e) => e.is_column_not_found(),
            JoinerError::Storage(e) => e.is_column_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, JoinerError>;
