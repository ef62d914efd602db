use thiserror::Error;

/// Malformed query input. Raised before anything reaches the store.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid base query: {0}")]
    InvalidBaseQuery(String),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Unsupported filter value for '{field}': {reason}")]
    UnsupportedFilter { field: String, reason: String },

    #[error("Invalid sort direction for '{field}': {value}")]
    InvalidSortDirection { field: String, value: String },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
