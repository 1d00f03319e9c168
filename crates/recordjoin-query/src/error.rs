use thiserror::Error;

/// Unified error type for all datasource operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Column is not part of the schema of the dataset or datasource
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Invalid or missing configuration attribute, unresolvable source reference
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Remote system of an adapter could not be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Query execution failed on the backend
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Invalid search string or query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataError {
    /// Create a "column not found" error for the given column
    pub fn column_not_found(column: impl AsRef<str>) -> Self {
        DataError::ColumnNotFound(format!("Column \"{}\" is not defined in schema", column.as_ref()))
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        DataError::BackendUnavailable(msg.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        DataError::InvalidQuery(msg.into())
    }

    /// Error for a combinator that references a source that was not defined before it
    pub fn unresolved_source(owner: &str, referenced: &str) -> Self {
        DataError::InvalidConfiguration(format!(
            "Error during initialization of datasource \"{}\": referenced datasource \"{}\" missing or defined incorrectly",
            owner, referenced
        ))
    }

    pub fn is_column_not_found(&self) -> bool {
        matches!(self, DataError::ColumnNotFound(_))
    }

    /// Backend level failures that adapters turn into empty results
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            DataError::BackendUnavailable(_) | DataError::QueryFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
